//! # Request Descriptor
//!
//! A connection to a feature service is described by a small XML document
//! rather than a query string. Credentials travel inside the document, so they
//! never show up in a URL, a process argument list or a log line.
//!
//! ```xml
//! <OGRWFSDataSource>
//!   <URL>https://example.org/wfs</URL>
//!   <UserPwd>user:password</UserPwd>
//!   <HttpAuth>BASIC</HttpAuth>
//!   <Version>1.1.0</Version>
//!   <PagingAllowed>ON</PagingAllowed>
//! </OGRWFSDataSource>
//! ```

use crate::domain::entities::JobConfig;
use crate::domain::errors::{ExtractError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

pub const AUTH_BASIC: &str = "BASIC";
pub const WFS_VERSION: &str = "1.1.0";

const XML_DECLARATION: &str = "<?xml version='1.0' encoding='UTF-8'?>\n";

#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename = "OGRWFSDataSource")]
pub struct RequestDescriptor {
    #[serde(rename = "URL")]
    pub url: String,
    /// `username:password`.
    #[serde(rename = "UserPwd", default, skip_serializing_if = "Option::is_none")]
    pub user_pwd: Option<String>,
    #[serde(rename = "HttpAuth")]
    pub http_auth: String,
    #[serde(rename = "Version")]
    pub version: String,
    /// `ON` or `OFF`.
    #[serde(rename = "PagingAllowed")]
    pub paging_allowed: String,
}

impl RequestDescriptor {
    pub fn from_job(job: &JobConfig, paging: bool) -> Self {
        Self {
            url: job.url.clone(),
            user_pwd: job
                .service_credentials
                .as_ref()
                .map(|c| format!("{}:{}", c.username, c.password)),
            http_auth: AUTH_BASIC.to_string(),
            version: WFS_VERSION.to_string(),
            paging_allowed: if paging { "ON" } else { "OFF" }.to_string(),
        }
    }

    pub fn paging_enabled(&self) -> bool {
        self.paging_allowed.eq_ignore_ascii_case("ON")
    }

    /// Splits `UserPwd` at the first colon; passwords may contain colons.
    pub fn credentials(&self) -> Option<(String, String)> {
        let pair = self.user_pwd.as_deref()?;
        match pair.split_once(':') {
            Some((user, pass)) => Some((user.to_string(), pass.to_string())),
            None => Some((pair.to_string(), String::new())),
        }
    }

    pub fn to_xml(&self) -> Result<String> {
        let body = quick_xml::se::to_string(self).map_err(|e| {
            ExtractError::ConnectionError(format!("Failed to serialize request descriptor: {}", e))
        })?;
        Ok(format!("{}{}", XML_DECLARATION, body))
    }

    pub fn from_xml(xml: &str) -> Result<Self> {
        quick_xml::de::from_str(xml).map_err(|e| {
            ExtractError::ConnectionError(format!("Malformed request descriptor: {}", e))
        })
    }

    /// Writes the descriptor where the source adapter can read it. On Unix the
    /// file is created owner-readable only.
    pub fn write_to(&self, path: &Path) -> Result<()> {
        let xml = self.to_xml()?;
        let mut options = OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let mut file = options.open(path)?;
        file.write_all(xml.as_bytes())?;
        Ok(())
    }

    pub fn read_from(path: &Path) -> Result<Self> {
        let xml = std::fs::read_to_string(path).map_err(|e| {
            ExtractError::ConnectionError(format!(
                "Cannot read request descriptor {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_xml(&xml)
    }
}

impl fmt::Debug for RequestDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestDescriptor")
            .field("url", &self.url)
            .field("user_pwd", &self.user_pwd.as_ref().map(|_| "***"))
            .field("http_auth", &self.http_auth)
            .field("version", &self.version)
            .field("paging_allowed", &self.paging_allowed)
            .finish()
    }
}
