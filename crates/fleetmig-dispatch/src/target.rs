//! Dispatch targets

use std::fmt;

/// A host to run on, with labels used only to correlate results
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RemoteTarget {
    /// Network address handed to the transport
    pub address: String,
    /// Identifying labels, e.g. model UUID then machine id
    pub labels: Vec<String>,
}

impl RemoteTarget {
    /// Unlabelled target
    #[must_use]
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            labels: Vec::new(),
        }
    }

    /// Append a label
    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.labels.push(label.into());
        self
    }

    /// Labels joined by spaces, or the address when there are none
    #[must_use]
    pub fn label(&self) -> String {
        if self.labels.is_empty() {
            self.address.clone()
        } else {
            self.labels.join(" ")
        }
    }
}

impl fmt::Display for RemoteTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.label(), self.address)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn label_falls_back_to_address() {
        let target = RemoteTarget::new("10.0.0.1");
        assert_eq!(target.label(), "10.0.0.1");

        let target = target.with_label("model-a").with_label("0");
        assert_eq!(target.label(), "model-a 0");
        assert_eq!(target.to_string(), "model-a 0 (10.0.0.1)");
    }
}
