// Copyright 2026 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use crate::domain::entities::{Credentials, DatabaseTarget};
use crate::domain::errors::{ExtractError, Result};
use postgres::{Client, Config, NoTls};
use std::time::Duration;

/// Connection parameters for one job's database target. Every job opens its
/// own connection; nothing is pooled across jobs.
#[derive(Debug, Clone)]
pub struct PgConnectionParams {
    pub host: String,
    pub port: u16,
    pub dbname: String,
    credentials: Option<Credentials>,
    connect_timeout: Duration,
}

impl PgConnectionParams {
    /// `server` is `host` or `host:port`; `default_port` fills in the latter.
    pub fn from_target(
        target: &DatabaseTarget,
        default_port: u16,
        connect_timeout: Duration,
    ) -> Result<Self> {
        let server = target.server.trim();
        let (host, port) = match server.rsplit_once(':') {
            Some((host, port)) if !host.contains(':') => {
                let port = port.parse::<u16>().map_err(|_| {
                    ExtractError::ConnectionError(format!(
                        "invalid port in db-server '{}'",
                        server
                    ))
                })?;
                (host, port)
            }
            _ => (server, default_port),
        };
        if host.is_empty() {
            return Err(ExtractError::ConnectionError("db-server is empty".into()));
        }
        if target.database.trim().is_empty() {
            return Err(ExtractError::ConnectionError("db-name is empty".into()));
        }

        Ok(Self {
            host: host.to_string(),
            port,
            dbname: target.database.trim().to_string(),
            credentials: target.credentials.clone(),
            connect_timeout,
        })
    }

    pub fn config(&self) -> Config {
        let mut config = Config::new();
        config
            .host(&self.host)
            .port(self.port)
            .dbname(&self.dbname)
            .application_name("wfs_extract")
            .connect_timeout(self.connect_timeout);
        if let Some(c) = &self.credentials {
            config.user(&c.username).password(&c.password);
        }
        config
    }

    pub fn connect(&self) -> Result<Client> {
        self.config().connect(NoTls).map_err(|e| {
            ExtractError::ConnectionError(format!(
                "Cannot connect to database {} on {}:{}: {}",
                self.dbname, self.host, self.port, e
            ))
        })
    }
}
