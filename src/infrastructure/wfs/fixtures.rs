//! Canned WFS responses shared by the adapter tests.

pub const CAPABILITIES: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<wfs:WFS_Capabilities version="1.1.0" xmlns:wfs="http://www.opengis.net/wfs" xmlns:ows="http://www.opengis.net/ows">
  <ows:ServiceIdentification><ows:Title>Parks</ows:Title></ows:ServiceIdentification>
  <ows:OperationsMetadata>
    <ows:Operation name="GetFeature"><ows:Parameter name="outputFormat"><ows:Value>application/json</ows:Value></ows:Parameter></ows:Operation>
  </ows:OperationsMetadata>
  <wfs:FeatureTypeList>
    <wfs:FeatureType>
      <wfs:Name>city:parks</wfs:Name>
      <wfs:Title>Parks &amp; Gardens</wfs:Title>
      <wfs:DefaultSRS>urn:ogc:def:crs:EPSG::27700</wfs:DefaultSRS>
      <ows:WGS84BoundingBox><ows:LowerCorner>-1 50</ows:LowerCorner></ows:WGS84BoundingBox>
    </wfs:FeatureType>
    <wfs:FeatureType>
      <wfs:Name>city:trees</wfs:Name>
      <wfs:DefaultSRS>urn:ogc:def:crs:EPSG::4326</wfs:DefaultSRS>
    </wfs:FeatureType>
  </wfs:FeatureTypeList>
</wfs:WFS_Capabilities>"#;

pub const SCHEMA: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<xsd:schema xmlns:xsd="http://www.w3.org/2001/XMLSchema" xmlns:gml="http://www.opengis.net/gml" xmlns:city="http://city">
  <xsd:import namespace="http://www.opengis.net/gml"/>
  <xsd:complexType name="parksType">
    <xsd:complexContent>
      <xsd:extension base="gml:AbstractFeatureType">
        <xsd:sequence>
          <xsd:element maxOccurs="1" minOccurs="0" name="park_id" nillable="true" type="xsd:int"/>
          <xsd:element maxOccurs="1" minOccurs="0" name="name" nillable="true" type="xsd:string"/>
          <xsd:element maxOccurs="1" minOccurs="0" name="the_geom" nillable="true" type="gml:MultiSurfacePropertyType"/>
          <xsd:element maxOccurs="1" minOccurs="0" name="area" nillable="true" type="xsd:double"/>
          <xsd:element name="status" minOccurs="0">
            <xsd:simpleType><xsd:restriction base="xsd:string"><xsd:maxLength value="10"/></xsd:restriction></xsd:simpleType>
          </xsd:element>
          <xsd:element maxOccurs="1" minOccurs="0" name="opened" nillable="true" type="xsd:date"/>
        </xsd:sequence>
      </xsd:extension>
    </xsd:complexContent>
  </xsd:complexType>
  <xsd:element name="parks" substitutionGroup="gml:_Feature" type="city:parksType"/>
</xsd:schema>"#;

/// GetFeature pages for `city:parks` with a page size of two.
pub fn parks_page(start_index: usize) -> String {
    let features = [
        r#"{"type":"Feature","id":"parks.1","geometry":{"type":"Point","coordinates":[10.0,10.0]},"properties":{"park_id":1,"name":"North","area":12.5,"status":"active","opened":"2001-05-01"}}"#,
        r#"{"type":"Feature","id":"parks.2","geometry":{"type":"Point","coordinates":[20.0,20.0]},"properties":{"park_id":2,"name":"South","area":3.0,"status":"closed","opened":null}}"#,
        r#"{"type":"Feature","id":"parks.3","geometry":{"type":"Polygon","coordinates":[[[50.0,50.0],[60.0,50.0],[60.0,60.0],[50.0,50.0]]]},"properties":{"park_id":"3","name":"East","area":7,"status":"active"}}"#,
        r#"{"type":"Feature","id":"parks.4","geometry":{"type":"Point","coordinates":[500.0,500.0]},"properties":{"park_id":4,"name":"Far","area":1.0,"status":"active"}}"#,
    ];
    let page: Vec<&str> = features.iter().skip(start_index).take(2).copied().collect();
    format!(
        r#"{{"type":"FeatureCollection","features":[{}]}}"#,
        page.join(",")
    )
}
