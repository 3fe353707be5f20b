use crate::error::{CliError, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::info;

/// Final state of a run, written as TOML.
#[derive(Serialize, Debug)]
#[serde(rename_all = "kebab-case")]
pub struct FieldSnapshot {
    pub nx: [usize; 3],
    pub lx: [f64; 3],
    pub n_segment: usize,
    pub f: f64,
    pub chi_n: f64,
    pub chain_model: String,
    pub seed: u64,
    pub langevin_steps: usize,
    pub langevin_scheme: String,
    pub converged: bool,
    pub partition_function: f64,
    pub hamiltonian: f64,
    /// `-ln(Q/V)` after every Langevin step.
    pub neg_log_partitions: Vec<f64>,
    pub w_plus: Vec<f64>,
    pub w_minus: Vec<f64>,
    pub phi_a: Vec<f64>,
    pub phi_b: Vec<f64>,
}

/// Fields saved periodically during Langevin dynamics.
#[derive(Serialize, Debug)]
#[serde(rename_all = "kebab-case")]
pub struct FieldCheckpoint {
    pub step: usize,
    pub nx: [usize; 3],
    pub lx: [f64; 3],
    pub n_segment: usize,
    pub f: f64,
    pub chi_n: f64,
    pub chain_model: String,
    pub nbar: f64,
    pub seed: u64,
    pub w_plus: Vec<f64>,
    pub w_minus: Vec<f64>,
}

/// `fields.toml` becomes `fields_000042.toml` next to it.
pub fn checkpoint_path(output: &Path, step: usize) -> PathBuf {
    let stem = output
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "fields".to_string());
    output.with_file_name(format!("{}_{:06}.toml", stem, step))
}

fn write_toml<T: Serialize>(value: &T, path: &Path) -> Result<()> {
    let content = toml::to_string(value).map_err(|e| CliError::FileParsing {
        path: path.to_path_buf(),
        source: e.into(),
    })?;
    std::fs::write(path, content)?;
    Ok(())
}

impl FieldSnapshot {
    pub fn write_to(&self, path: &Path) -> Result<()> {
        write_toml(self, path)?;
        info!("Wrote fields to {:?}", path);
        Ok(())
    }
}

impl FieldCheckpoint {
    pub fn write_to(&self, path: &Path) -> Result<()> {
        write_toml(self, path)?;
        info!(step = self.step, "Wrote checkpoint to {:?}", path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_is_written_as_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fields.toml");
        let snapshot = FieldSnapshot {
            nx: [2, 1, 1],
            lx: [1.0, 1.0, 1.0],
            n_segment: 4,
            f: 0.5,
            chi_n: 10.0,
            chain_model: "Gaussian".to_string(),
            seed: 1,
            langevin_steps: 0,
            langevin_scheme: "predictor-corrector".to_string(),
            converged: true,
            partition_function: 1.0,
            hamiltonian: 0.25,
            neg_log_partitions: Vec::new(),
            w_plus: vec![0.5, -0.5],
            w_minus: vec![0.0, 0.0],
            phi_a: vec![0.5, 0.5],
            phi_b: vec![0.5, 0.5],
        };
        snapshot.write_to(&path).unwrap();

        let table: toml::Table = std::fs::read_to_string(&path).unwrap().parse().unwrap();
        assert_eq!(table["n-segment"].as_integer(), Some(4));
        assert_eq!(table["chain-model"].as_str(), Some("Gaussian"));
        assert_eq!(table["w-plus"].as_array().map(|a| a.len()), Some(2));
        assert_eq!(table["hamiltonian"].as_float(), Some(0.25));
    }

    #[test]
    fn checkpoint_paths_carry_the_step_number() {
        assert_eq!(
            checkpoint_path(Path::new("out/fields.toml"), 42),
            PathBuf::from("out/fields_000042.toml")
        );
        assert_eq!(
            checkpoint_path(Path::new("run"), 0),
            PathBuf::from("run_000000.toml")
        );
    }

    #[test]
    fn checkpoint_is_written_as_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = checkpoint_path(&dir.path().join("fields.toml"), 3);
        let checkpoint = FieldCheckpoint {
            step: 3,
            nx: [2, 1, 1],
            lx: [1.0, 1.0, 1.0],
            n_segment: 4,
            f: 0.5,
            chi_n: 10.0,
            chain_model: "Discrete".to_string(),
            nbar: 1024.0,
            seed: 5489,
            w_plus: vec![0.1, -0.1],
            w_minus: vec![0.2, -0.2],
        };
        checkpoint.write_to(&path).unwrap();

        let table: toml::Table = std::fs::read_to_string(&path).unwrap().parse().unwrap();
        assert_eq!(table["step"].as_integer(), Some(3));
        assert_eq!(table["nbar"].as_float(), Some(1024.0));
        assert_eq!(table["w-minus"].as_array().map(|a| a.len()), Some(2));
    }

    #[test]
    fn unwritable_path_reports_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let snapshot_path = dir.path().join("missing").join("fields.toml");
        let snapshot = FieldSnapshot {
            nx: [1, 1, 1],
            lx: [1.0, 1.0, 1.0],
            n_segment: 2,
            f: 0.5,
            chi_n: 1.0,
            chain_model: "Discrete".to_string(),
            seed: 0,
            langevin_steps: 0,
            langevin_scheme: "etd".to_string(),
            converged: false,
            partition_function: 1.0,
            hamiltonian: 0.0,
            neg_log_partitions: Vec::new(),
            w_plus: vec![0.0],
            w_minus: vec![0.0],
            phi_a: vec![0.5],
            phi_b: vec![0.5],
        };
        assert!(matches!(
            snapshot.write_to(&snapshot_path),
            Err(CliError::Io(_))
        ));
    }
}
