use super::{decode_name, encode_name, DnsError, WireBuffer, QCLASS_IN};
use bdxnet_common::naming::SERVICE_TLD;
use serde::Serialize;
use std::fmt;
use tracing::error;

/// A DNS question record
///
/// `qname` is kept as received, dot-terminated. The name helpers below are
/// what the resolver uses to decide whether a query is local, addresses a
/// service subdomain or has to go to the directory.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Question {
    qname: String,
    qtype: u16,
    qclass: u16,
}

impl Question {
    /// Create an `IN` class question
    pub fn new(name: impl Into<String>, qtype: u16) -> Result<Self, DnsError> {
        Self::with_class(name, qtype, QCLASS_IN)
    }

    pub fn with_class(name: impl Into<String>, qtype: u16, qclass: u16) -> Result<Self, DnsError> {
        let qname = name.into();
        if qname.is_empty() {
            return Err(DnsError::EmptyName);
        }
        Ok(Self {
            qname,
            qtype,
            qclass,
        })
    }

    pub fn qname(&self) -> &str {
        &self.qname
    }

    pub fn qtype(&self) -> u16 {
        self.qtype
    }

    pub fn qclass(&self) -> u16 {
        self.qclass
    }

    /// Write name, type and class; stops at the first step that fails
    pub fn encode(&self, buf: &mut WireBuffer) -> Result<(), DnsError> {
        encode_name(buf, &self.qname)?;
        buf.put_u16(self.qtype)?;
        buf.put_u16(self.qclass)
    }

    /// Read a question at the cursor
    pub fn decode(buf: &mut WireBuffer) -> Result<Self, DnsError> {
        let qname = decode_name(buf).map_err(|e| {
            error!("failed to decode name: {}", e);
            e
        })?;
        let qtype = buf.read_u16().map_err(|e| {
            error!("failed to decode type: {}", e);
            e
        })?;
        let qclass = buf.read_u16().map_err(|e| {
            error!("failed to decode class: {}", e);
            e
        })?;

        Self::with_class(qname, qtype, qclass)
    }

    /// `candidate` equals the name, a missing trailing dot is added once
    pub fn is_name(&self, candidate: &str) -> bool {
        if candidate.is_empty() || candidate.ends_with('.') {
            return candidate == self.qname;
        }
        format!("{}.", candidate) == self.qname
    }

    /// `localhost.bdx.` or any name under it
    pub fn is_localhost(&self) -> bool {
        let localhost = format!("localhost.{}.", SERVICE_TLD);
        self.qname == localhost || self.qname.ends_with(&format!(".{}", localhost))
    }

    /// At least three labels, e.g. `www.example.bdx.`
    pub fn has_subdomains(&self) -> bool {
        let mut labels: Vec<&str> = self.qname.split('.').collect();
        while labels.first().map_or(false, |label| label.is_empty()) {
            labels.remove(0);
        }
        while labels.last().map_or(false, |label| label.is_empty()) {
            labels.pop();
        }
        labels.len() >= 3
    }

    /// Everything left of the last two labels, empty if there is nothing
    pub fn subdomains(&self) -> String {
        let bytes = self.qname.as_bytes();
        if bytes.len() < 2 {
            return String::new();
        }

        let tld_dot = match bytes[..bytes.len() - 1].iter().rposition(|&b| b == b'.') {
            Some(pos) if pos > 0 => pos,
            _ => return String::new(),
        };

        match bytes[..tld_dot].iter().rposition(|&b| b == b'.') {
            Some(pos) if pos > 0 => self.qname[..pos].to_string(),
            _ => String::new(),
        }
    }

    /// The name without its final (root) dot
    pub fn name(&self) -> String {
        match self.qname.rfind('.') {
            Some(pos) => self.qname[..pos].to_string(),
            None => self.qname.clone(),
        }
    }

    /// Whether the last occurrence of `tld` ends one character before the
    /// end of the name.
    ///
    /// This is a substring test, not a label test: `has_tld("dx")` is true
    /// for `example.bdx.`. Pass the TLD with its leading dot (`".bdx"`) to
    /// match whole labels.
    pub fn has_tld(&self, tld: &str) -> bool {
        match (self.qname.rfind(tld), self.qname.len().checked_sub(tld.len() + 1)) {
            (Some(found), Some(expected)) => found == expected,
            _ => false,
        }
    }
}

impl fmt::Display for Question {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[Question qname={} qtype=0x{:04x} qclass=0x{:04x}]",
            self.qname, self.qtype, self.qclass
        )
    }
}
