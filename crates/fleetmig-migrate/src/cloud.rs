//! Cloud variants
//!
//! The controller step needs different documents and credential material per
//! cloud type. Each supported type is one [`CloudVariant`], looked up by tag
//! with [`cloud_variant`]. Adding a cloud means adding a variant.

use crate::error::StepError;
use crate::runner::PlannedFile;
use fleetmig_store::{Document, FieldError, Value};
use std::fmt;
use std::path::Path;

/// Per-cloud behaviour of the controller upgrade
pub trait CloudVariant: Send + Sync + fmt::Debug {
    /// Cloud type tag, as found in the controller model's `type` setting
    fn tag(&self) -> &'static str;

    /// Credential auth type
    fn auth_type(&self) -> &'static str;

    /// Model settings this cloud needs, beyond the common ones
    fn required_settings(&self) -> &'static [&'static str];

    /// Model settings dropped by the upgrade, beyond the common ones
    fn removed_model_settings(&self) -> &'static [&'static str];

    /// Extra fields of the cloud document (`endpoint`, `regions`)
    ///
    /// # Errors
    /// Fails if a required setting is missing.
    fn cloud_fields(&self, settings: &Document) -> Result<Document, FieldError>;

    /// Credential attributes, if the auth type has any
    ///
    /// # Errors
    /// Fails if a required setting is missing.
    fn credential_attributes(&self, _settings: &Document) -> Result<Option<Document>, FieldError> {
        Ok(None)
    }

    /// Local files holding credential material
    ///
    /// # Errors
    /// Fails if a required setting is missing.
    fn credential_files(
        &self,
        _settings: &Document,
        _cert_dir: &Path,
    ) -> Result<Vec<PlannedFile>, FieldError> {
        Ok(Vec::new())
    }

    /// Check every required setting is a string
    ///
    /// # Errors
    /// The first missing or mistyped setting.
    fn check_settings(&self, settings: &Document) -> Result<(), FieldError> {
        for name in self.required_settings() {
            settings.get_str(name)?;
        }
        Ok(())
    }

    /// The cloud document
    ///
    /// # Errors
    /// Fails if a required setting is missing.
    fn cloud_document(&self, settings: &Document) -> Result<Document, FieldError> {
        let mut doc = Document::new()
            .with("name", self.tag())
            .with("type", self.tag())
            .with("auth-types", vec![Value::from(self.auth_type())]);
        for (name, value) in self.cloud_fields(settings)?.iter() {
            doc.insert(name, value.clone());
        }
        Ok(doc)
    }
}

/// Local LXD daemon
#[derive(Debug, Clone, Copy, Default)]
pub struct LxdCloud;

const LXD_CERTS: [(&str, &str); 3] = [
    ("client-cert", "lxd-client.crt"),
    ("client-key", "lxd-client.key"),
    ("server-cert", "lxd-server.crt"),
];

impl CloudVariant for LxdCloud {
    fn tag(&self) -> &'static str {
        "lxd"
    }

    fn auth_type(&self) -> &'static str {
        "empty"
    }

    fn required_settings(&self) -> &'static [&'static str] {
        &["client-cert", "client-key", "server-cert"]
    }

    fn removed_model_settings(&self) -> &'static [&'static str] {
        &["client-cert", "client-key", "namespace", "remote-url", "server-cert"]
    }

    fn cloud_fields(&self, _settings: &Document) -> Result<Document, FieldError> {
        Ok(Document::new().with("regions", Document::new().with("localhost", Document::new())))
    }

    fn credential_files(
        &self,
        settings: &Document,
        cert_dir: &Path,
    ) -> Result<Vec<PlannedFile>, FieldError> {
        LXD_CERTS
            .iter()
            .map(|(setting, filename)| {
                settings
                    .get_str(setting)
                    .map(|contents| PlannedFile::private(cert_dir.join(filename), contents))
            })
            .collect()
    }
}

/// MAAS region controller
#[derive(Debug, Clone, Copy, Default)]
pub struct MaasCloud;

impl CloudVariant for MaasCloud {
    fn tag(&self) -> &'static str {
        "maas"
    }

    fn auth_type(&self) -> &'static str {
        "oauth1"
    }

    fn required_settings(&self) -> &'static [&'static str] {
        &["maas-server", "maas-oauth"]
    }

    fn removed_model_settings(&self) -> &'static [&'static str] {
        &["maas-agent-name", "maas-oauth", "maas-server"]
    }

    fn cloud_fields(&self, settings: &Document) -> Result<Document, FieldError> {
        Ok(Document::new().with("endpoint", settings.get_str("maas-server")?))
    }

    fn credential_attributes(&self, settings: &Document) -> Result<Option<Document>, FieldError> {
        Ok(Some(
            Document::new().with("maas-oauth", settings.get_str("maas-oauth")?),
        ))
    }
}

/// Variant for a cloud type tag
///
/// # Errors
/// `StepError::UnsupportedCloud` for unknown tags.
pub fn cloud_variant(tag: &str) -> Result<Box<dyn CloudVariant>, StepError> {
    match tag {
        "lxd" => Ok(Box::new(LxdCloud)),
        "maas" => Ok(Box::new(MaasCloud)),
        other => Err(StepError::UnsupportedCloud(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn lxd_settings() -> Document {
        Document::new()
            .with("type", "lxd")
            .with("client-cert", "CLIENT CERT")
            .with("client-key", "CLIENT KEY")
            .with("server-cert", "SERVER CERT")
    }

    #[test]
    fn lookup_by_tag() {
        assert_eq!(cloud_variant("lxd").unwrap().tag(), "lxd");
        assert_eq!(cloud_variant("maas").unwrap().auth_type(), "oauth1");
        assert!(matches!(
            cloud_variant("ec2"),
            Err(StepError::UnsupportedCloud(tag)) if tag == "ec2"
        ));
    }

    #[test]
    fn lxd_writes_certificates() {
        let files = LxdCloud
            .credential_files(&lxd_settings(), Path::new("/etc/juju"))
            .unwrap();
        let paths: Vec<_> = files.iter().map(|f| f.path.display().to_string()).collect();
        assert_eq!(
            paths,
            vec![
                "/etc/juju/lxd-client.crt",
                "/etc/juju/lxd-client.key",
                "/etc/juju/lxd-server.crt"
            ]
        );
        assert_eq!(files[1].contents, "CLIENT KEY");
        assert_eq!(files[1].mode, 0o600);
    }

    #[test]
    fn lxd_cloud_document() {
        let doc = LxdCloud.cloud_document(&lxd_settings()).unwrap();
        assert_eq!(doc.get_str("type").unwrap(), "lxd");
        assert_eq!(doc.get_list("auth-types").unwrap(), &[Value::from("empty")]);
        assert!(doc.get_doc("regions.localhost").unwrap().is_empty());
    }

    #[test]
    fn maas_requires_server_and_oauth() {
        let settings = Document::new().with("maas-server", "http://maas/MAAS");
        assert!(MaasCloud.check_settings(&settings).is_err());

        let settings = settings.with("maas-oauth", "a:b:c");
        MaasCloud.check_settings(&settings).unwrap();
        assert_eq!(
            MaasCloud.credential_attributes(&settings).unwrap(),
            Some(Document::new().with("maas-oauth", "a:b:c"))
        );
        assert_eq!(
            MaasCloud.cloud_document(&settings).unwrap().get_str("endpoint").unwrap(),
            "http://maas/MAAS"
        );
    }
}
