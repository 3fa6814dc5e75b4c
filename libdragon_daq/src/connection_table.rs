use std::path::Path;

use super::constants::MAX_CONNECTIONS;
use super::error::ConnectionTableError;

/// One entry of the connection table: where a FEB listens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FebAddress {
    pub host: String,
    pub port: u16,
    /// Numeric tail of the address (digits after the last `.`), used to tag
    /// output files and report columns. 0 when the address has no such tail.
    pub suffix: u32,
}

impl FebAddress {
    fn new(host: &str, port: u16) -> Self {
        let suffix = host
            .rsplit('.')
            .next()
            .map(|tail| {
                let digits: String = tail.chars().take_while(|c| c.is_ascii_digit()).collect();
                digits.parse().unwrap_or(0)
            })
            .unwrap_or(0);
        Self {
            host: host.to_string(),
            port,
            suffix,
        }
    }
}

/// Ordered list of FEB addresses loaded from the connection table file.
///
/// The file holds one `address port` pair per line. Lines starting with `#`
/// and blank lines are skipped. The line count bounds the number of
/// connections of the run.
#[derive(Debug, Clone)]
pub struct ConnectionTable {
    pub entries: Vec<FebAddress>,
}

impl ConnectionTable {
    pub fn load(path: &Path) -> Result<Self, ConnectionTableError> {
        if !path.exists() {
            return Err(ConnectionTableError::BadFilePath(path.to_path_buf()));
        }
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    pub fn parse(contents: &str) -> Result<Self, ConnectionTableError> {
        let mut entries = Vec::new();
        for (number, line) in contents.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let mut fields = line.split_whitespace();
            let (host, port) = match (fields.next(), fields.next()) {
                (Some(host), Some(port)) => (host, port),
                _ => return Err(ConnectionTableError::BadEntry(number + 1, line.to_string())),
            };
            let port: u16 = port
                .parse()
                .map_err(|_| ConnectionTableError::BadEntry(number + 1, line.to_string()))?;
            entries.push(FebAddress::new(host, port));
        }
        if entries.is_empty() {
            return Err(ConnectionTableError::NoEntries);
        }
        if entries.len() > MAX_CONNECTIONS {
            return Err(ConnectionTableError::TooManyEntries(entries.len()));
        }
        Ok(Self { entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
