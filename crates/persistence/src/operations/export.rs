//! Export of stored instance files to an external sink.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::config::{ExportConfig, FeatureConfig};
use crate::core::{FileStore, InstanceStore, SecretStore, resolve_instance_identifiers};
use crate::error::{StorageResult, ValidationError};
use crate::types::{PartitionKey, VersionedInstanceIdentifier, validate_uid};

use super::outcome::{ItemOutcome, ItemOutcomes, count_failed};

/// Destination setting that carries a container URL with an access signature.
pub const CONTAINER_SAS_URI: &str = "ContainerSasUri";

/// A whole study.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Study {
    /// Study Instance UID.
    pub study_instance_uid: String,
}

/// A whole series.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Series {
    /// Study Instance UID.
    pub study_instance_uid: String,
    /// Series Instance UID.
    pub series_instance_uid: String,
}

/// One instance, all stored versions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Instance {
    /// Study Instance UID.
    pub study_instance_uid: String,
    /// Series Instance UID.
    pub series_instance_uid: String,
    /// SOP Instance UID.
    pub sop_instance_uid: String,
}

/// What to export, grouped by level. Duplicates collapse.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportSource {
    /// Studies to export.
    pub studies: BTreeSet<Study>,
    /// Series to export.
    pub series: BTreeSet<Series>,
    /// Instances to export.
    pub instances: BTreeSet<Instance>,
}

impl ExportSource {
    /// Parses `study`, `study/series` and `study/series/instance` paths.
    ///
    /// # Examples
    ///
    /// ```
    /// use dicom_persistence::operations::{ExportSource, Series};
    ///
    /// let source = ExportSource::parse(&["123", "323/123", "1111/22/3333", "323/123"]).unwrap();
    /// assert_eq!(source.studies.len(), 1);
    /// assert_eq!(source.series.len(), 1);
    /// assert_eq!(source.instances.len(), 1);
    /// assert!(source.series.contains(&Series {
    ///     study_instance_uid: "323".to_string(),
    ///     series_instance_uid: "123".to_string(),
    /// }));
    ///
    /// assert!(ExportSource::parse(&["1/2/3/4"]).is_err());
    /// ```
    ///
    /// # Errors
    ///
    /// * `ValidationError::InvalidExportSource` - If a path is empty, has
    ///   more than three segments or a segment is not a valid UID
    pub fn parse<S: AsRef<str>>(paths: &[S]) -> Result<Self, ValidationError> {
        let mut source = Self::default();
        for path in paths {
            let path = path.as_ref();
            let invalid = |message: String| ValidationError::InvalidExportSource {
                value: path.to_string(),
                message,
            };

            let segments: Vec<&str> = path.trim_matches('/').split('/').collect();
            for segment in &segments {
                validate_uid("UID", segment).map_err(|e| invalid(e.to_string()))?;
            }

            match segments.as_slice() {
                [study] => {
                    source.studies.insert(Study {
                        study_instance_uid: study.to_string(),
                    });
                }
                [study, series] => {
                    source.series.insert(Series {
                        study_instance_uid: study.to_string(),
                        series_instance_uid: series.to_string(),
                    });
                }
                [study, series, sop] => {
                    source.instances.insert(Instance {
                        study_instance_uid: study.to_string(),
                        series_instance_uid: series.to_string(),
                        sop_instance_uid: sop.to_string(),
                    });
                }
                _ => {
                    return Err(invalid(format!(
                        "expected at most 3 segments, found {}",
                        segments.len()
                    )));
                }
            }
        }
        Ok(source)
    }

    /// Total number of elements.
    pub fn len(&self) -> usize {
        self.studies.len() + self.series.len() + self.instances.len()
    }

    /// Returns true if nothing is selected.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Where exported files go.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportDestination {
    /// Sink kind, for example `AzureBlob`.
    #[serde(rename = "type")]
    pub destination_type: String,
    /// Sink specific settings.
    #[serde(default)]
    pub settings: BTreeMap<String, String>,
    /// Set once credentials have been moved to the secret store.
    #[serde(default)]
    pub secured: bool,
}

impl fmt::Debug for ExportDestination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let settings: BTreeMap<&str, &str> = self
            .settings
            .iter()
            .map(|(k, v)| {
                let shown = if k == CONTAINER_SAS_URI && !self.secured {
                    "<redacted>"
                } else {
                    v.as_str()
                };
                (k.as_str(), shown)
            })
            .collect();
        f.debug_struct("ExportDestination")
            .field("destination_type", &self.destination_type)
            .field("settings", &settings)
            .field("secured", &self.secured)
            .finish()
    }
}

impl ExportDestination {
    /// Creates a destination.
    pub fn new(destination_type: impl Into<String>) -> Self {
        Self {
            destination_type: destination_type.into(),
            ..Default::default()
        }
    }

    /// Adds a setting.
    pub fn with_setting(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.settings.insert(key.into(), value.into());
        self
    }

    /// Moves the [`CONTAINER_SAS_URI`] setting into `secrets` and replaces
    /// it with the secret name. Destinations without it, or already
    /// secured, are returned unchanged.
    pub async fn secure(
        mut self,
        secrets: &dyn SecretStore,
        secret_prefix: &str,
    ) -> StorageResult<Self> {
        if self.secured {
            return Ok(self);
        }
        if let Some(uri) = self.settings.get(CONTAINER_SAS_URI) {
            let name = format!("{}-{}", secret_prefix, uuid::Uuid::new_v4());
            let handle = secrets.store_secret(&name, uri).await?;
            self.settings
                .insert(CONTAINER_SAS_URI.to_string(), handle.name);
            self.secured = true;
        }
        Ok(self)
    }

    /// Reads a setting, fetching it from `secrets` if it was secured.
    pub async fn setting(
        &self,
        key: &str,
        secrets: &dyn SecretStore,
    ) -> StorageResult<Option<String>> {
        match self.settings.get(key) {
            Some(name) if self.secured && key == CONTAINER_SAS_URI => {
                secrets.get_secret(name).await.map(Some)
            }
            other => Ok(other.cloned()),
        }
    }
}

/// Receives exported files.
#[async_trait]
pub trait ExportSink: Send + Sync {
    /// Writes one file.
    async fn copy(
        &self,
        identifier: &VersionedInstanceIdentifier,
        content: Bytes,
    ) -> StorageResult<()>;

    /// Records a failure for one identifier.
    async fn append_error(
        &self,
        identifier: &VersionedInstanceIdentifier,
        message: &str,
    ) -> StorageResult<()>;
}

/// Result of an export call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExportProgress {
    /// Files copied.
    pub exported: usize,
    /// Identifiers that failed.
    pub failed: usize,
    /// Per-identifier results in resolution order.
    pub outcomes: ItemOutcomes,
    /// Cancellation stopped the call early.
    pub cancelled: bool,
}

/// Copies stored files to an [`ExportSink`].
pub struct ExportService {
    instances: Arc<dyn InstanceStore>,
    files: Arc<dyn FileStore>,
    secrets: Arc<dyn SecretStore>,
    features: FeatureConfig,
    config: ExportConfig,
}

impl ExportService {
    /// Creates a service.
    pub fn new(
        instances: Arc<dyn InstanceStore>,
        files: Arc<dyn FileStore>,
        secrets: Arc<dyn SecretStore>,
        features: FeatureConfig,
        config: ExportConfig,
    ) -> Self {
        Self {
            instances,
            files,
            secrets,
            features,
            config,
        }
    }

    fn ensure_enabled(&self) -> Result<(), ValidationError> {
        if !self.features.enable_export {
            return Err(ValidationError::FeatureDisabled {
                feature: "export".to_string(),
            });
        }
        Ok(())
    }

    /// Secures a destination with the configured secret prefix.
    pub async fn prepare_destination(
        &self,
        destination: ExportDestination,
    ) -> StorageResult<ExportDestination> {
        self.ensure_enabled()?;
        destination
            .secure(self.secrets.as_ref(), &self.config.secret_prefix)
            .await
    }

    /// Resolves every source element to identifiers, dropping duplicates.
    pub async fn resolve(
        &self,
        partition_key: PartitionKey,
        source: &ExportSource,
    ) -> StorageResult<Vec<VersionedInstanceIdentifier>> {
        let store = self.instances.as_ref();
        let mut resolved = Vec::new();

        for study in &source.studies {
            resolved.extend(
                resolve_instance_identifiers(
                    store,
                    partition_key,
                    &study.study_instance_uid,
                    None,
                    None,
                )
                .await?,
            );
        }
        for series in &source.series {
            resolved.extend(
                resolve_instance_identifiers(
                    store,
                    partition_key,
                    &series.study_instance_uid,
                    Some(&series.series_instance_uid),
                    None,
                )
                .await?,
            );
        }
        for instance in &source.instances {
            resolved.extend(
                resolve_instance_identifiers(
                    store,
                    partition_key,
                    &instance.study_instance_uid,
                    Some(&instance.series_instance_uid),
                    Some(&instance.sop_instance_uid),
                )
                .await?,
            );
        }

        let mut seen = HashSet::new();
        resolved.retain(|id| seen.insert(id.clone()));
        Ok(resolved)
    }

    /// Copies every file selected by `source` to `sink`.
    ///
    /// # Errors
    ///
    /// * `StorageError::Validation(FeatureDisabled)` - If export is switched off
    /// * Store errors while resolving the source. Failures while copying are
    ///   reported in the returned progress instead.
    pub async fn export(
        &self,
        partition_key: PartitionKey,
        source: &ExportSource,
        sink: &dyn ExportSink,
        cancel: &CancellationToken,
    ) -> StorageResult<ExportProgress> {
        self.ensure_enabled()?;
        let identifiers = self.resolve(partition_key, source).await?;
        let total = identifiers.len();
        tracing::info!(count = total, "Exporting instances");

        let outcomes: ItemOutcomes = futures::stream::iter(identifiers)
            .take_while(|_| futures::future::ready(!cancel.is_cancelled()))
            .map(|identifier| async move {
                let result = self.export_one(&identifier, sink).await;
                if let Err(err) = &result {
                    tracing::warn!(
                        identifier = %identifier,
                        error = %err,
                        "Failed to export instance"
                    );
                    if let Err(sink_err) = sink.append_error(&identifier, &err.to_string()).await {
                        tracing::error!(
                            identifier = %identifier,
                            error = %sink_err,
                            "Failed to record export error"
                        );
                    }
                }
                let outcome = ItemOutcome::from(&result);
                (identifier, outcome)
            })
            .buffered(self.config.max_concurrency.max(1))
            .collect()
            .await;

        let failed = count_failed(&outcomes);
        Ok(ExportProgress {
            exported: outcomes.len() - failed,
            failed,
            cancelled: outcomes.len() < total,
            outcomes,
        })
    }

    async fn export_one(
        &self,
        identifier: &VersionedInstanceIdentifier,
        sink: &dyn ExportSink,
    ) -> StorageResult<()> {
        let content = self.files.get_file(identifier).await?;
        sink.copy(identifier, content).await
    }
}

impl fmt::Debug for ExportService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExportService")
            .field("backend", &self.instances.backend_name())
            .field("features", &self.features)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::InMemorySecretStore;

    #[test]
    fn test_parse_groups_by_level() {
        let source = ExportSource::parse(&["123", "323/123", "1111/22/3333"]).unwrap();
        assert!(source.studies.contains(&Study {
            study_instance_uid: "123".to_string()
        }));
        assert!(source.instances.contains(&Instance {
            study_instance_uid: "1111".to_string(),
            series_instance_uid: "22".to_string(),
            sop_instance_uid: "3333".to_string(),
        }));
        assert_eq!(source.len(), 3);
    }

    #[test]
    fn test_parse_collapses_duplicates() {
        let source = ExportSource::parse(&["1/2", "1/2"]).unwrap();
        assert_eq!(source.series.len(), 1);
        assert!(source.studies.is_empty());
    }

    #[test]
    fn test_parse_rejects_bad_paths() {
        for bad in ["", "1//2", "1/2/3/4", "1/abc"] {
            let err = ExportSource::parse(&[bad]).unwrap_err();
            assert!(
                matches!(err, ValidationError::InvalidExportSource { .. }),
                "{bad}"
            );
        }
    }

    #[tokio::test]
    async fn test_secure_moves_sas_uri_to_secret_store() {
        let secrets = InMemorySecretStore::new();
        let destination = ExportDestination::new("AzureBlob")
            .with_setting(CONTAINER_SAS_URI, "https://account/container?sig=abc")
            .with_setting("Folder", "exports");

        let secured = destination.secure(&secrets, "export").await.unwrap();
        assert!(secured.secured);
        let name = &secured.settings[CONTAINER_SAS_URI];
        assert!(name.starts_with("export-"));
        assert_eq!(secured.settings["Folder"], "exports");
        assert_eq!(
            secured.setting(CONTAINER_SAS_URI, &secrets).await.unwrap().as_deref(),
            Some("https://account/container?sig=abc")
        );
        assert!(!format!("{:?}", secured).contains("sig=abc"));
    }

    #[tokio::test]
    async fn test_destination_without_credentials_is_unchanged() {
        let secrets = InMemorySecretStore::new();
        let destination = ExportDestination::new("Local").with_setting("Folder", "x");
        let secured = destination.clone().secure(&secrets, "export").await.unwrap();
        assert_eq!(secured, destination);
        assert!(secrets.is_empty());
    }
}
