//! Values document resolution.
//!
//! Precedence, highest first: command-line overrides → on-disk values file →
//! interactive-wizard answers → embedded defaults. The result is rendered
//! once into the per-run values document and reused for the controller
//! install and the root application's parameter block.

use std::path::{Path, PathBuf};

use crate::error::ChartError;

/// Defaults applied when nothing else specifies a key.
const EMBEDDED_DEFAULTS: &str = "\
deployment:
  mode: oss-tenant
ingress:
  host: localhost
controller:
  server:
    insecure: true
";

/// Inputs to one values resolution.
#[derive(Debug, Clone, Default)]
pub struct ValuesResolution {
    /// `key.path=value` overrides from the command line (highest).
    pub overrides: Vec<(String, String)>,
    /// Optional on-disk values file.
    pub file: Option<PathBuf>,
    /// Answers collected by the interactive wizard.
    pub wizard: Vec<(String, String)>,
    /// Optional raw values bytes appended verbatim below the defaults.
    pub raw: Option<Vec<u8>>,
}

impl ValuesResolution {
    /// Merge all sources into one document.
    pub fn resolve(&self) -> Result<serde_yaml::Value, ChartError> {
        let mut doc: serde_yaml::Value = serde_yaml::from_str(EMBEDDED_DEFAULTS)
            .map_err(|e| ChartError::Install(format!("embedded defaults are invalid: {}", e)))?;

        if let Some(raw) = &self.raw {
            let overlay: serde_yaml::Value = serde_yaml::from_slice(raw)
                .map_err(|e| ChartError::Install(format!("raw values are invalid: {}", e)))?;
            merge(&mut doc, overlay);
        }

        for (key, value) in &self.wizard {
            set_path(&mut doc, key, value);
        }

        if let Some(path) = &self.file {
            let content = std::fs::read_to_string(path).map_err(|e| {
                ChartError::Install(format!("cannot read values file {}: {}", path.display(), e))
            })?;
            let overlay: serde_yaml::Value = serde_yaml::from_str(&content).map_err(|e| {
                ChartError::Install(format!("values file {} is invalid: {}", path.display(), e))
            })?;
            merge(&mut doc, overlay);
        }

        for (key, value) in &self.overrides {
            set_path(&mut doc, key, value);
        }

        Ok(doc)
    }

    /// Resolve and render into the per-run values document.
    pub fn render_to(&self, path: &Path) -> Result<serde_yaml::Value, ChartError> {
        let doc = self.resolve()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let rendered = serde_yaml::to_string(&doc)
            .map_err(|e| ChartError::Install(format!("cannot render values: {}", e)))?;
        std::fs::write(path, rendered)?;
        Ok(doc)
    }
}

/// Load a previously rendered values document.
pub fn load(path: &Path) -> Result<serde_yaml::Value, ChartError> {
    let content = std::fs::read_to_string(path)?;
    serde_yaml::from_str(&content)
        .map_err(|e| ChartError::Install(format!("values file {} is invalid: {}", path.display(), e)))
}

/// Deep-merge mappings; scalars and sequences in `overlay` replace `base`.
fn merge(base: &mut serde_yaml::Value, overlay: serde_yaml::Value) {
    match (base, overlay) {
        (serde_yaml::Value::Mapping(base_map), serde_yaml::Value::Mapping(overlay_map)) => {
            for (key, value) in overlay_map {
                match base_map.get_mut(&key) {
                    Some(existing) => merge(existing, value),
                    None => {
                        base_map.insert(key, value);
                    }
                }
            }
        }
        (base_slot, overlay) => *base_slot = overlay,
    }
}

/// Set a dotted key path, parsing the value as a YAML scalar so `true` and
/// `3` keep their types.
fn set_path(root: &mut serde_yaml::Value, dotted: &str, raw: &str) {
    let parsed: serde_yaml::Value =
        serde_yaml::from_str(raw).unwrap_or_else(|_| serde_yaml::Value::String(raw.to_string()));
    let mut current = root;
    let segments: Vec<&str> = dotted.split('.').collect();
    for (index, segment) in segments.iter().enumerate() {
        let key = serde_yaml::Value::String(segment.to_string());
        if !current.is_mapping() {
            *current = serde_yaml::Value::Mapping(serde_yaml::Mapping::new());
        }
        let map = current.as_mapping_mut().expect("mapping ensured above");
        if index == segments.len() - 1 {
            map.insert(key, parsed);
            return;
        }
        current = map
            .entry(key)
            .or_insert_with(|| serde_yaml::Value::Mapping(serde_yaml::Mapping::new()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn get<'a>(doc: &'a serde_yaml::Value, path: &[&str]) -> &'a serde_yaml::Value {
        let mut current = doc;
        for segment in path {
            current = current.get(segment).unwrap();
        }
        current
    }

    #[test]
    fn defaults_apply_when_nothing_else_set() {
        let doc = ValuesResolution::default().resolve().unwrap();
        assert_eq!(get(&doc, &["deployment", "mode"]).as_str(), Some("oss-tenant"));
    }

    #[test]
    fn precedence_overrides_beat_file_beats_wizard() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("values.yaml");
        std::fs::write(&file, "deployment:\n  mode: saas-tenant\nextra: file\n").unwrap();

        let resolution = ValuesResolution {
            overrides: vec![("deployment.mode".into(), "saas-shared".into())],
            file: Some(file),
            wizard: vec![
                ("deployment.mode".into(), "oss-tenant".into()),
                ("wizard.answer".into(), "yes".into()),
            ],
            raw: None,
        };
        let doc = resolution.resolve().unwrap();
        assert_eq!(get(&doc, &["deployment", "mode"]).as_str(), Some("saas-shared"));
        assert_eq!(get(&doc, &["extra"]).as_str(), Some("file"));
        assert_eq!(get(&doc, &["wizard", "answer"]).as_str(), Some("yes"));
    }

    #[test]
    fn render_and_reload_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("values.yaml");
        let resolution = ValuesResolution {
            overrides: vec![("ingress.host".into(), "demo.localhost".into())],
            ..Default::default()
        };
        let rendered = resolution.render_to(&path).unwrap();
        let reloaded = load(&path).unwrap();
        assert_eq!(rendered, reloaded);
    }

    #[test]
    fn scalar_types_survive_override_parsing() {
        let resolution = ValuesResolution {
            overrides: vec![
                ("replicas".into(), "3".into()),
                ("debug".into(), "true".into()),
                ("name".into(), "plain".into()),
            ],
            ..Default::default()
        };
        let doc = resolution.resolve().unwrap();
        assert_eq!(get(&doc, &["replicas"]).as_u64(), Some(3));
        assert_eq!(get(&doc, &["debug"]).as_bool(), Some(true));
        assert_eq!(get(&doc, &["name"]).as_str(), Some("plain"));
    }
}
