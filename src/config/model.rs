use std::path::PathBuf;

use serde::Deserialize;

use crate::archive::ArchiveLimits;
use crate::exec::{HelperSettings, Interpreter, SandboxEnvironment, SandboxPolicy};

#[derive(Debug, Deserialize, Default, Clone, PartialEq)]
pub struct Config {
    pub sandbox: Option<SandboxSection>,
    pub policy: Option<PolicySection>,
    pub archive: Option<ArchiveSection>,
}

/// Backend selection and host wiring.
#[derive(Debug, Deserialize, Default, Clone, PartialEq)]
pub struct SandboxSection {
    /// Run jobs inside the isolation helper. Defaults to `true`.
    pub isolation: Option<bool>,
    pub interpreter: Option<String>,
    pub inline_flag: Option<String>,
    pub isolation_helper: Option<PathBuf>,
    pub resource_limiter: Option<PathBuf>,
    pub package_dir: Option<PathBuf>,
    pub scratch_root: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Default, Clone, PartialEq)]
pub struct PolicySection {
    pub memory_limit_mb: Option<u64>,
    pub time_limit_seconds: Option<u64>,
    pub allow_network: Option<bool>,
    pub allowed_paths: Option<Vec<PathBuf>>,
    pub max_output_bytes: Option<usize>,
}

#[derive(Debug, Deserialize, Default, Clone, PartialEq)]
pub struct ArchiveSection {
    pub max_compression_ratio: Option<f64>,
    pub max_uncompressed_bytes: Option<u64>,
}

impl Config {
    /// Check every field and report all problems at once.
    pub fn validate(&self) -> Result<(), crate::config::ConfigError> {
        let mut errors = Vec::new();

        if let Some(sandbox) = &self.sandbox {
            if let Some(program) = &sandbox.interpreter
                && program.trim().is_empty()
            {
                errors.push("sandbox.interpreter: must not be empty".to_string());
            }
            if let Some(flag) = &sandbox.inline_flag
                && flag.trim().is_empty()
            {
                errors.push("sandbox.inline_flag: must not be empty".to_string());
            }
            if let Some(dir) = &sandbox.package_dir
                && !dir.is_absolute()
            {
                errors.push(format!(
                    "sandbox.package_dir: must be an absolute path (got '{}')",
                    dir.display()
                ));
            }
        }

        if let Some(policy) = &self.policy {
            if policy.memory_limit_mb == Some(0) {
                errors.push("policy.memory_limit_mb: must be greater than 0".to_string());
            }
            if policy.time_limit_seconds == Some(0) {
                errors.push("policy.time_limit_seconds: must be greater than 0".to_string());
            }
            if policy.max_output_bytes == Some(0) {
                errors.push("policy.max_output_bytes: must be greater than 0".to_string());
            }
            for (i, path) in policy.allowed_paths.iter().flatten().enumerate() {
                if !path.is_absolute() {
                    errors.push(format!(
                        "policy.allowed_paths[{i}]: must be an absolute path (got '{}')",
                        path.display()
                    ));
                }
            }
        }

        if let Some(archive) = &self.archive {
            if let Some(ratio) = archive.max_compression_ratio
                && !(ratio.is_finite() && ratio > 0.0)
            {
                errors.push(format!(
                    "archive.max_compression_ratio: must be a positive number (got {ratio})"
                ));
            }
            if archive.max_uncompressed_bytes == Some(0) {
                errors.push("archive.max_uncompressed_bytes: must be greater than 0".to_string());
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(crate::config::ConfigError::Validation(errors))
        }
    }

    /// Merge two configs. Scalars from `other` win; lists are appended.
    pub fn merge(self, other: Config) -> Config {
        Config {
            sandbox: Self::merge_sandbox(self.sandbox, other.sandbox),
            policy: Self::merge_policy(self.policy, other.policy),
            archive: Self::merge_archive(self.archive, other.archive),
        }
    }

    fn merge_sandbox(
        base: Option<SandboxSection>,
        over: Option<SandboxSection>,
    ) -> Option<SandboxSection> {
        match (base, over) {
            (Some(b), Some(o)) => Some(SandboxSection {
                isolation: o.isolation.or(b.isolation),
                interpreter: o.interpreter.or(b.interpreter),
                inline_flag: o.inline_flag.or(b.inline_flag),
                isolation_helper: o.isolation_helper.or(b.isolation_helper),
                resource_limiter: o.resource_limiter.or(b.resource_limiter),
                package_dir: o.package_dir.or(b.package_dir),
                scratch_root: o.scratch_root.or(b.scratch_root),
            }),
            (b, o) => o.or(b),
        }
    }

    fn merge_policy(
        base: Option<PolicySection>,
        over: Option<PolicySection>,
    ) -> Option<PolicySection> {
        match (base, over) {
            (Some(b), Some(o)) => Some(PolicySection {
                memory_limit_mb: o.memory_limit_mb.or(b.memory_limit_mb),
                time_limit_seconds: o.time_limit_seconds.or(b.time_limit_seconds),
                allow_network: o.allow_network.or(b.allow_network),
                allowed_paths: Self::merge_vecs(b.allowed_paths, o.allowed_paths),
                max_output_bytes: o.max_output_bytes.or(b.max_output_bytes),
            }),
            (b, o) => o.or(b),
        }
    }

    fn merge_archive(
        base: Option<ArchiveSection>,
        over: Option<ArchiveSection>,
    ) -> Option<ArchiveSection> {
        match (base, over) {
            (Some(b), Some(o)) => Some(ArchiveSection {
                max_compression_ratio: o.max_compression_ratio.or(b.max_compression_ratio),
                max_uncompressed_bytes: o.max_uncompressed_bytes.or(b.max_uncompressed_bytes),
            }),
            (b, o) => o.or(b),
        }
    }

    /// Append `over` to `base`, skipping entries already present.
    fn merge_vecs<T: PartialEq>(base: Option<Vec<T>>, over: Option<Vec<T>>) -> Option<Vec<T>> {
        match (base, over) {
            (Some(mut b), Some(o)) => {
                for item in o {
                    if !b.contains(&item) {
                        b.push(item);
                    }
                }
                Some(b)
            }
            (b, o) => b.or(o),
        }
    }

    pub fn policy(&self) -> SandboxPolicy {
        let defaults = SandboxPolicy::default();
        let Some(section) = &self.policy else {
            return defaults;
        };
        SandboxPolicy {
            memory_limit_mb: section.memory_limit_mb.unwrap_or(defaults.memory_limit_mb),
            time_limit_seconds: section
                .time_limit_seconds
                .unwrap_or(defaults.time_limit_seconds),
            allow_network: section.allow_network.unwrap_or(defaults.allow_network),
            allowed_paths: section.allowed_paths.clone().unwrap_or_default(),
            max_output_bytes: section.max_output_bytes.unwrap_or(defaults.max_output_bytes),
        }
    }

    pub fn archive_limits(&self) -> ArchiveLimits {
        let defaults = ArchiveLimits::default();
        match &self.archive {
            Some(section) => ArchiveLimits {
                max_compression_ratio: section
                    .max_compression_ratio
                    .unwrap_or(defaults.max_compression_ratio),
                max_uncompressed_bytes: section
                    .max_uncompressed_bytes
                    .unwrap_or(defaults.max_uncompressed_bytes),
            },
            None => defaults,
        }
    }

    /// Selection environment for the running host.
    pub fn environment(&self) -> SandboxEnvironment {
        let section = self.sandbox.clone().unwrap_or_default();
        let helper_defaults = HelperSettings::default();

        let mut interpreter = section
            .interpreter
            .map(Interpreter::new)
            .unwrap_or_default();
        if let Some(flag) = section.inline_flag {
            interpreter.inline_flag = flag;
        }

        SandboxEnvironment {
            helpers: HelperSettings {
                isolation_helper: section
                    .isolation_helper
                    .unwrap_or(helper_defaults.isolation_helper),
                resource_limiter: section
                    .resource_limiter
                    .unwrap_or(helper_defaults.resource_limiter),
                package_dir: section.package_dir,
            },
            interpreter,
            scratch_root: section.scratch_root,
            ..SandboxEnvironment::for_host(section.isolation.unwrap_or(true))
        }
    }
}

/// Parse a YAML string into a `Config`.
pub fn parse_config(yaml: &str) -> Result<Config, crate::config::ConfigError> {
    let config: Config = serde_saphyr::from_str(yaml)?;
    Ok(config)
}
