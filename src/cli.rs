use std::path::PathBuf;

use clap::Parser;

use crate::config::ConnectionParameter;

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Infer a table schema from a delimited file and bulk load it into MonetDB",
    long_about = None
)]
pub struct Cli {
    /// Delimited text file whose first line holds the column names
    pub file: PathBuf,
    /// Target table (derived from the file name when omitted)
    pub table: Option<String>,
    /// Field separator (supports ',', 'tab', ';', '|', 'space')
    #[arg(short = 'S', long, default_value = ",", value_parser = parse_char)]
    pub separator: char,
    /// Quote character enclosing fields that contain separators or line breaks
    #[arg(short = 'Q', long, default_value = "\"", value_parser = parse_char)]
    pub quote: char,
    /// Server port
    #[arg(short = 'P', long)]
    pub port: Option<u16>,
    /// User name
    #[arg(short = 'U', long = "uid")]
    pub user: Option<String>,
    /// Password
    #[arg(long = "pwd")]
    pub password: Option<String>,
    /// Server host; local hosts are loaded in-process, remote ones through the client program
    #[arg(short = 'H', long)]
    pub host: Option<String>,
    /// Database name
    #[arg(short = 'd', long)]
    pub database: Option<String>,
    /// Client program used for remote hosts (defaults to mclient)
    #[arg(long)]
    pub driver: Option<String>,
    /// Field value treated as NULL in addition to empty fields
    #[arg(long = "null-token")]
    pub null_token: Option<String>,
    /// Character encoding of the input file (defaults to utf-8)
    #[arg(long)]
    pub encoding: Option<String>,
    /// YAML connection profile; command-line flags override its values
    #[arg(long)]
    pub profile: Option<PathBuf>,
    /// Print the generated SQL before executing it
    #[arg(long = "print-sql")]
    pub print_sql: bool,
    /// Scan the file and print the SQL without connecting to a server
    #[arg(short = 'D', long = "dry-run")]
    pub dry_run: bool,
    /// Write the scan results as JSON to this path
    #[arg(long)]
    pub report: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Generate SQL, skip the load.
    DryRun,
    PrintAndExecute,
    Execute,
}

impl Cli {
    pub fn mode(&self) -> RunMode {
        if self.dry_run {
            RunMode::DryRun
        } else if self.print_sql {
            RunMode::PrintAndExecute
        } else {
            RunMode::Execute
        }
    }

    /// Parameters for the flags actually given, in a fixed order.
    pub fn connection_parameters(&self) -> Vec<ConnectionParameter> {
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

pub fn parse_char(value: &str) -> Result<char, String> {
    match value {
        "tab" | "\\t" => Ok('\t'),
        "comma" => Ok(','),
        "pipe" => Ok('|'),
        "semicolon" => Ok(';'),
        "space" => Ok(' '),
        other => {
            let mut chars = other.chars();
            let first = chars
                .next()
                .ok_or_else(|| "Character cannot be empty".to_string())?;
            if chars.next().is_some() {
                return Err(format!("Expected a single character, got '{other}'"));
            }
            Ok(first)
        }
    }
}
