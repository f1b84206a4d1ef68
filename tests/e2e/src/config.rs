//! Configuration builder for e2e tests
//!
//! Generates host configuration files in the directive format the adapter
//! reads, next to the usual host directives it must skip.

use anyhow::Result;
use cephfs_oss::config::Variant;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

/// Everything a generated configuration file sets
#[derive(Debug, Clone)]
pub struct TestConfig {
    pub variant: Variant,
    pub id: Option<String>,
    pub ceph_config: PathBuf,
    pub volume: PathBuf,
    pub loglevel: Option<String>,
    pub aio_workers: Option<usize>,
    pub drain_timeout: Option<String>,
    /// Lines appended verbatim
    pub extra: Vec<String>,
}

impl TestConfig {
    /// Render the configuration file text
    pub fn to_config_text(&self) -> String {
        let p = self.variant.config_prefix();
        let mut out = String::new();

        // host directives the adapter has to ignore
        out.push_str("# generated by cephfs-oss-e2e\n");
        out.push_str("all.role server\n");
        out.push_str("ofs.osslib libXrdCephOss.so\n\n");

        let _ = writeln!(out, "{}config {}", p, self.ceph_config.display());
        let _ = writeln!(out, "{}volume {}", p, self.volume.display());
        if let Some(id) = &self.id {
            let _ = writeln!(out, "{}id {}", p, id);
        }
        if let Some(level) = &self.loglevel {
            let _ = writeln!(out, "{}loglevel {}", p, level);
        }
        if let Some(workers) = self.aio_workers {
            let _ = writeln!(out, "{}aio.workers {}", p, workers);
        }
        if let Some(timeout) = &self.drain_timeout {
            let _ = writeln!(out, "{}drain_timeout {}", p, timeout);
        }
        for line in &self.extra {
            out.push_str(line);
            out.push('\n');
        }
        out
    }

    /// Write the configuration file to `path`
    pub fn write_to(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.to_config_text())?;
        Ok(())
    }
}

/// Builder for [`TestConfig`]
#[derive(Debug, Clone)]
pub struct TestConfigBuilder {
    config: TestConfig,
}

impl TestConfigBuilder {
    pub fn new(ceph_config: impl Into<PathBuf>, volume: impl Into<PathBuf>) -> Self {
        Self {
            config: TestConfig {
                variant: Variant::Cephfs,
                id: None,
                ceph_config: ceph_config.into(),
                volume: volume.into(),
                loglevel: None,
                aio_workers: None,
                drain_timeout: None,
                extra: Vec::new(),
            },
        }
    }

    pub fn variant(mut self, variant: Variant) -> Self {
        self.config.variant = variant;
        self
    }

    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.config.id = Some(id.into());
        self
    }

    pub fn loglevel(mut self, level: impl Into<String>) -> Self {
        self.config.loglevel = Some(level.into());
        self
    }

    pub fn aio_workers(mut self, workers: usize) -> Self {
        self.config.aio_workers = Some(workers);
        self
    }

    pub fn drain_timeout(mut self, timeout: impl Into<String>) -> Self {
        self.config.drain_timeout = Some(timeout.into());
        self
    }

    pub fn ceph_config(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.ceph_config = path.into();
        self
    }

    /// Append a raw line, e.g. a misspelled directive
    pub fn line(mut self, line: impl Into<String>) -> Self {
        self.config.extra.push(line.into());
        self
    }

    pub fn build(self) -> TestConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rendered_directives() {
        let text = TestConfigBuilder::new("/etc/ceph/ceph.conf", "/srv/vol")
            .id("fst")
            .aio_workers(4)
            .build()
            .to_config_text();

        assert!(text.contains("cephfs.config /etc/ceph/ceph.conf\n"));
        assert!(text.contains("cephfs.volume /srv/vol\n"));
        assert!(text.contains("cephfs.id fst\n"));
        assert!(text.contains("cephfs.aio.workers 4\n"));
        assert!(!text.contains("loglevel"));
    }

    #[test]
    fn test_legacy_prefix() {
        let text = TestConfigBuilder::new("/c", "/v")
            .variant(Variant::Legacy)
            .build()
            .to_config_text();
        assert!(text.contains("cephoss.volume /v\n"));
    }
}
