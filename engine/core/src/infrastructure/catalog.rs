// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Sector Catalog Loader
//
// Reads the sector catalog (codes, keywords, candidate assets, benchmarks)
// from YAML or JSON. A missing or empty catalog is a configuration error.

use std::collections::HashSet;
use std::path::Path;

use crate::domain::config::ConfigurationError;
use crate::domain::sector::SectorCatalog;

pub fn load_catalog(path: &Path) -> Result<SectorCatalog, ConfigurationError> {
    if !path.exists() {
        return Err(ConfigurationError::MissingFile {
            what: "sector catalog".to_string(),
            path: path.to_path_buf(),
        });
    }

    let content = std::fs::read_to_string(path).map_err(|e| ConfigurationError::Unreadable {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;

    let is_json = path
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    let catalog: SectorCatalog = if is_json {
        serde_json::from_str(&content).map_err(|e| e.to_string())
    } else {
        serde_yaml::from_str(&content).map_err(|e| e.to_string())
    }
    .map_err(|reason| ConfigurationError::Unreadable {
        path: path.to_path_buf(),
        reason,
    })?;

    validate_catalog(&catalog)?;
    tracing::info!(sectors = catalog.sectors.len(), "Loaded sector catalog from {:?}", path);
    Ok(catalog)
}

pub fn validate_catalog(catalog: &SectorCatalog) -> Result<(), ConfigurationError> {
    if catalog.is_empty() {
        return Err(ConfigurationError::Invalid(
            "sector catalog defines no sectors".to_string(),
        ));
    }
    let mut seen = HashSet::new();
    for sector in &catalog.sectors {
        if sector.code.is_general() {
            return Err(ConfigurationError::Invalid(
                "GENERAL is reserved for unclassified headlines".to_string(),
            ));
        }
        if !seen.insert(sector.code.clone()) {
            return Err(ConfigurationError::Invalid(format!(
                "sector {} is defined twice",
                sector.code
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::sector::SectorCode;
    use tempfile::TempDir;

    const CATALOG: &str = r#"
sectors:
  - code: XLK
    name: Technology
    keywords: [chip, software, cloud]
    assets:
      - { ticker: NVDA, name: NVIDIA, focus: semis }
      - { ticker: MSFT, name: Microsoft, focus: cloud }
  - code: crypto
    name: Crypto
    benchmark: BITO
    keywords: [bitcoin]
"#;

    #[test]
    fn test_load_yaml_catalog() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("sectors.yaml");
        std::fs::write(&path, CATALOG).unwrap();

        let catalog = load_catalog(&path).unwrap();
        assert_eq!(catalog.codes(), vec![SectorCode::from("XLK"), SectorCode::from("CRYPTO")]);
        assert_eq!(catalog.candidates(&SectorCode::from("XLK")).len(), 2);
        assert_eq!(catalog.benchmark_for(&SectorCode::from("CRYPTO")), "BITO");
    }

    #[test]
    fn test_missing_catalog() {
        let err = load_catalog(Path::new("/nonexistent/sectors.yaml")).unwrap_err();
        assert!(matches!(err, ConfigurationError::MissingFile { .. }));
    }

    #[test]
    fn test_duplicate_sector_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("sectors.json");
        std::fs::write(
            &path,
            r#"{"sectors":[{"code":"XLE","name":"Energy"},{"code":"xle","name":"Energy again"}]}"#,
        )
        .unwrap();
        assert!(matches!(load_catalog(&path), Err(ConfigurationError::Invalid(_))));
    }
}
