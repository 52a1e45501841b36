// Errors callers may want to match on; everything else travels as anyhow::Error

use std::fmt;

#[derive(Debug)]
pub struct OfflineRetrievalError {
    pub file: String,
}

impl fmt::Display for OfflineRetrievalError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "Offline mode: cannot fetch {} and no cached copy exists",
            self.file
        )
    }
}

impl std::error::Error for OfflineRetrievalError {}

/// A SPARQL endpoint answered with a non-success status.
#[derive(Debug)]
pub struct EndpointError {
    pub url: String,
    pub status: u16,
    pub body: String,
}

impl fmt::Display for EndpointError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Endpoint {} returned HTTP {}", self.url, self.status)?;
        if !self.body.is_empty() {
            write!(f, ": {}", self.body)?;
        }
        Ok(())
    }
}

impl std::error::Error for EndpointError {}

#[derive(Debug)]
pub struct InvalidDelimiterError {
    pub delimiter: String,
    pub reason: String,
}

impl fmt::Display for InvalidDelimiterError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "Invalid delimiter pattern '{}': {}",
            self.delimiter, self.reason
        )
    }
}

impl std::error::Error for InvalidDelimiterError {}
