//! Connection parameters and the optional YAML connection profile.
//!
//! Parameters only override a default when they are explicitly present:
//! every source (profile file, command line) contributes a list of
//! [`ConnectionParameter`]s, and [`ConnectionSettings::from_parameters`]
//! applies them over the defaults in order.

use std::{fmt, fs::File, io::BufReader, path::Path};

use anyhow::{Context, Result};
use serde::Deserialize;

pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_PORT: u16 = 50000;
pub const DEFAULT_USER: &str = "monetdb";
pub const DEFAULT_PASSWORD: &str = "monetdb";
pub const DEFAULT_DATABASE: &str = "demo";
pub const DEFAULT_DRIVER: &str = "mclient";

#[derive(Clone, PartialEq, Eq)]
pub enum ConnectionParameter {
    Port(u16),
    User(String),
    Password(String),
    Host(String),
    /// Client program used by the external-process loader.
    Driver(String),
    Database(String),
}

impl fmt::Debug for ConnectionParameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionParameter::Port(port) => f.debug_tuple("Port").field(port).finish(),
            ConnectionParameter::User(user) => f.debug_tuple("User").field(user).finish(),
            ConnectionParameter::Password(_) => f.debug_tuple("Password").field(&"***").finish(),
            ConnectionParameter::Host(host) => f.debug_tuple("Host").field(host).finish(),
            ConnectionParameter::Driver(driver) => f.debug_tuple("Driver").field(driver).finish(),
            ConnectionParameter::Database(db) => f.debug_tuple("Database").field(db).finish(),
        }
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionSettings {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
    pub driver: String,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            user: DEFAULT_USER.to_string(),
            password: DEFAULT_PASSWORD.to_string(),
            database: DEFAULT_DATABASE.to_string(),
            driver: DEFAULT_DRIVER.to_string(),
        }
    }
}

impl fmt::Debug for ConnectionSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionSettings")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"***")
            .field("database", &self.database)
            .field("driver", &self.driver)
            .finish()
    }
}

impl ConnectionSettings {
    /// Defaults overridden by `parameters`, later entries winning.
    pub fn from_parameters(parameters: &[ConnectionParameter]) -> Self {
        let mut settings = Self::default();
        for parameter in parameters {
            settings.apply(parameter);
        }
        settings
    }

    pub fn apply(&mut self, parameter: &ConnectionParameter) {
        match parameter {
            ConnectionParameter::Port(port) => self.port = *port,
            ConnectionParameter::User(user) => self.user = user.clone(),
            ConnectionParameter::Password(password) => self.password = password.clone(),
            ConnectionParameter::Host(host) => self.host = host.clone(),
            ConnectionParameter::Driver(driver) => self.driver = driver.clone(),
            ConnectionParameter::Database(database) => self.database = database.clone(),
        }
    }

    /// `host:port/database`, for messages.
    pub fn target(&self) -> String {
        format!("{}:{}/{}", self.host, self.port, self.database)
    }
}

/// Connection profile read from YAML. Every key is optional.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct Profile {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub database: Option<String>,
    pub driver: Option<String>,
    pub null_token: Option<String>,
}

impl Profile {
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("Opening profile {path:?}"))?;
        let profile = serde_yaml::from_reader(BufReader::new(file))
            .with_context(|| format!("Parsing profile YAML {path:?}"))?;
        Ok(profile)
    }

    pub fn parameters(&self) -> Vec<ConnectionParameter> {
        let mut parameters = Vec::new();
        if let Some(host) = &self.host {
            parameters.push(ConnectionParameter::Host(host.clone()));
        }
        if let Some(port) = self.port {
            parameters.push(ConnectionParameter::Port(port));
        }
        if let Some(user) = &self.user {
            parameters.push(ConnectionParameter::User(user.clone()));
        }
        if let Some(password) = &self.password {
            parameters.push(ConnectionParameter::Password(password.clone()));
        }
        if let Some(database) = &self.database {
            parameters.push(ConnectionParameter::Database(database.clone()));
        }
        if let Some(driver) = &self.driver {
            parameters.push(ConnectionParameter::Driver(driver.clone()));
        }
        parameters
    }
}
