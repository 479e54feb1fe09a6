//! Configuration types for the coordinator
//!
//! Every benchmark ships a YAML config keyed by its name. The tree has one
//! entry per provider (`Azure`, `GCP`, `AWS`) wherever sizing differs. A
//! user YAML file is deep-merged over it, CLI overrides are applied on top,
//! and the result is resolved for one cloud into an immutable
//! [`BenchmarkSpec`].

use crate::error::ConfigError;
use crate::lifecycle::WaitConfig;
use cloudbench_common::defaults::DEFAULT_PASSWORD_LENGTH;
use cloudbench_common::{
    Cloud, DatabaseEngine, DatabaseSpec, DiskSpec, MachineType, RunUri, VmGroupSpec, VmSpec,
};
use garde::Validate;
use rand::Rng;
use rand::seq::SliceRandom;
use serde::Deserialize;
use serde_yaml::Value;
use serde_yaml::mapping::Entry;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment fallback for `--database-password`
pub const PASSWORD_ENV: &str = "CLOUDBENCH_DB_PASSWORD";

/// Loads the declarative spec tree of one benchmark
pub trait SpecSource {
    /// The benchmark's section of the config, with user overrides applied
    fn load(&self, benchmark: &str, defaults: &str) -> Result<Value, ConfigError>;
}

/// Built-in YAML config, optionally overlaid with a user config file
#[derive(Debug, Clone, Default)]
pub struct YamlSpecSource {
    user_config: Option<Value>,
}

impl YamlSpecSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overlay user-supplied YAML (same shape as the built-in config)
    pub fn with_user_yaml(yaml: &str, origin: &str) -> Result<Self, ConfigError> {
        let user_config = serde_yaml::from_str(yaml).map_err(|e| ConfigError::parse(origin, e))?;
        Ok(Self {
            user_config: Some(user_config),
        })
    }

    /// Overlay a user config file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let origin = path.display().to_string();
        let yaml = std::fs::read_to_string(path).map_err(|e| ConfigError::io(&origin, e))?;
        Self::with_user_yaml(&yaml, &origin)
    }
}

impl SpecSource for YamlSpecSource {
    fn load(&self, benchmark: &str, defaults: &str) -> Result<Value, ConfigError> {
        let tree: Value = serde_yaml::from_str(defaults)
            .map_err(|e| ConfigError::parse(format!("built-in config of '{benchmark}'"), e))?;
        let mut section = tree
            .get(benchmark)
            .cloned()
            .ok_or_else(|| ConfigError::MissingSection {
                benchmark: benchmark.to_string(),
                section: benchmark.to_string(),
            })?;

        if let Some(overlay) = self.user_config.as_ref().and_then(|u| u.get(benchmark)) {
            merge_yaml(&mut section, overlay.clone());
        }
        Ok(section)
    }
}

/// Deep-merge `overlay` into `base`: mappings merge key by key, anything
/// else in `overlay` replaces what is in `base`
pub fn merge_yaml(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Mapping(base), Value::Mapping(overlay)) => {
            for (key, value) in overlay {
                match base.entry(key) {
                    Entry::Occupied(mut e) => merge_yaml(e.get_mut(), value),
                    Entry::Vacant(e) => {
                        e.insert(value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}

/// User overrides from the command line
#[derive(Clone, Default)]
pub struct SpecOverrides {
    pub database: Option<DatabaseEngine>,
    pub database_username: Option<String>,
    pub database_password: Option<String>,
    pub database_version: Option<String>,
    pub data_disk_size: Option<u32>,
    pub high_availability: Option<bool>,
    pub zone: Option<String>,
}

impl fmt::Debug for SpecOverrides {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpecOverrides")
            .field("database", &self.database)
            .field("database_username", &self.database_username)
            .field(
                "database_password",
                &self.database_password.as_ref().map(|_| "<redacted>"),
            )
            .field("database_version", &self.database_version)
            .field("data_disk_size", &self.data_disk_size)
            .field("high_availability", &self.high_availability)
            .field("zone", &self.zone)
            .finish()
    }
}

#[derive(Debug, Deserialize)]
struct RawBenchmarkConfig {
    #[serde(default)]
    description: String,
    #[serde(default)]
    managed_relational_db: Option<RawDatabaseConfig>,
    #[serde(default)]
    vm_groups: BTreeMap<String, RawVmGroup>,
    #[serde(default)]
    workload: Value,
}

#[derive(Debug, Deserialize)]
struct RawDatabaseConfig {
    database: DatabaseEngine,
    #[serde(default)]
    database_version: Option<String>,
    #[serde(default)]
    database_name: Option<String>,
    #[serde(default)]
    database_username: Option<String>,
    #[serde(default)]
    database_password: Option<String>,
    #[serde(default)]
    high_availability: bool,
    #[serde(default)]
    vm_spec: BTreeMap<Cloud, RawVmSpec>,
    #[serde(default)]
    disk_spec: BTreeMap<Cloud, DiskSpec>,
}

#[derive(Debug, Deserialize)]
struct RawVmGroup {
    #[serde(default)]
    vm_spec: BTreeMap<Cloud, RawVmSpec>,
    #[serde(default)]
    disk_spec: BTreeMap<Cloud, DiskSpec>,
    #[serde(default = "default_vm_count")]
    vm_count: u32,
}

fn default_vm_count() -> u32 {
    1
}

/// Per-provider VM sizing as written in config; zone may come from `--zone`
#[derive(Debug, Clone, Deserialize)]
struct RawVmSpec {
    machine_type: Option<MachineType>,
    #[serde(default)]
    zone: Option<String>,
    #[serde(default)]
    image: Option<String>,
    #[serde(default)]
    image_project: Option<String>,
}

/// Benchmark spec resolved for one cloud; immutable once built
#[derive(Debug, Clone)]
pub struct BenchmarkSpec {
    pub name: String,
    pub description: String,
    pub cloud: Cloud,
    pub run_uri: RunUri,
    pub database: Option<DatabaseSpec>,
    pub vm_groups: BTreeMap<String, VmGroupSpec>,
    /// Benchmark-specific knobs, interpreted by the benchmark itself
    pub workload: Value,
}

impl BenchmarkSpec {
    /// Resolve a merged config tree for `cloud`, apply overrides and
    /// validate the result
    pub fn resolve(
        name: &str,
        tree: Value,
        cloud: Cloud,
        run_uri: &RunUri,
        overrides: &SpecOverrides,
    ) -> Result<Self, ConfigError> {
        let raw: RawBenchmarkConfig = serde_yaml::from_value(tree)
            .map_err(|e| ConfigError::parse(format!("config of '{name}'"), e))?;

        let missing = |section: String| ConfigError::MissingSection {
            benchmark: name.to_string(),
            section,
        };

        let database = raw
            .managed_relational_db
            .map(|db| resolve_database(db, cloud, run_uri, overrides, &missing))
            .transpose()?;

        let mut vm_groups = BTreeMap::new();
        for (group, raw_group) in raw.vm_groups {
            let raw_vm = raw_group
                .vm_spec
                .get(&cloud)
                .ok_or_else(|| missing(format!("vm_groups.{group}.vm_spec.{cloud:?}")))?;
            let vm = resolve_vm(raw_vm, overrides, || {
                missing(format!("vm_groups.{group}.vm_spec.{cloud:?}"))
            })?;
            let spec = VmGroupSpec {
                vm,
                disk: raw_group.disk_spec.get(&cloud).cloned(),
                vm_count: raw_group.vm_count,
            };
            spec.validate()
                .map_err(|r| ConfigError::invalid(format!("vm group '{group}'"), &r))?;
            vm_groups.insert(group, spec);
        }

        Ok(Self {
            name: name.to_string(),
            description: raw.description,
            cloud,
            run_uri: run_uri.clone(),
            database,
            vm_groups,
            workload: raw.workload,
        })
    }

    /// Zone of the first resource, where a run-wide container is placed
    pub fn primary_zone(&self) -> Option<&str> {
        self.database
            .as_ref()
            .map(|db| db.vm.zone.as_str())
            .or_else(|| self.vm_groups.values().next().map(|g| g.vm.zone.as_str()))
    }
}

fn resolve_vm(
    raw: &RawVmSpec,
    overrides: &SpecOverrides,
    missing: impl Fn() -> ConfigError,
) -> Result<VmSpec, ConfigError> {
    let zone = overrides
        .zone
        .clone()
        .or_else(|| raw.zone.clone())
        .ok_or_else(&missing)?;
    let machine_type = raw.machine_type.clone().ok_or_else(&missing)?;
    Ok(VmSpec {
        machine_type,
        zone,
        image: raw.image.clone(),
        image_project: raw.image_project.clone(),
    })
}

fn resolve_database(
    raw: RawDatabaseConfig,
    cloud: Cloud,
    run_uri: &RunUri,
    overrides: &SpecOverrides,
    missing: &impl Fn(String) -> ConfigError,
) -> Result<DatabaseSpec, ConfigError> {
    let raw_vm = raw
        .vm_spec
        .get(&cloud)
        .ok_or_else(|| missing(format!("managed_relational_db.vm_spec.{cloud:?}")))?;
    let vm = resolve_vm(raw_vm, overrides, || {
        missing(format!("managed_relational_db.vm_spec.{cloud:?}"))
    })?;

    let mut disk = raw
        .disk_spec
        .get(&cloud)
        .cloned()
        .ok_or_else(|| missing(format!("managed_relational_db.disk_spec.{cloud:?}")))?;
    if let Some(size) = overrides.data_disk_size {
        disk.disk_size = size;
    }

    let spec = DatabaseSpec {
        engine: overrides.database.unwrap_or(raw.database),
        version: overrides.database_version.clone().or(raw.database_version),
        username: overrides
            .database_username
            .clone()
            .or(raw.database_username)
            .unwrap_or_else(|| default_username(run_uri)),
        password: overrides
            .database_password
            .clone()
            .or(raw.database_password)
            .unwrap_or_else(generate_password),
        database_name: raw
            .database_name
            .unwrap_or_else(|| default_database_name(run_uri)),
        high_availability: overrides.high_availability.unwrap_or(raw.high_availability),
        vm,
        disk,
    };
    spec.validate()
        .map_err(|r| ConfigError::invalid("managed database spec", &r))?;
    Ok(spec)
}

/// Default database server name for a run
pub fn default_database_name(run_uri: &RunUri) -> String {
    format!("cloudbench-db-{run_uri}")
}

/// Default database admin user for a run
pub fn default_username(run_uri: &RunUri) -> String {
    format!("cloudbench_{run_uri}")
}

/// Random alphanumeric password with at least one upper-case letter, one
/// lower-case letter and one digit
pub fn generate_password() -> String {
    const UPPER: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ";
    const LOWER: &[u8] = b"abcdefghijklmnopqrstuvwxyz";
    const DIGITS: &[u8] = b"0123456789";

    let mut rng = rand::thread_rng();
    let mut bytes: Vec<u8> = [UPPER, LOWER, DIGITS]
        .iter()
        .map(|set| set[rng.gen_range(0..set.len())])
        .collect();
    bytes.extend(
        (bytes.len()..DEFAULT_PASSWORD_LENGTH).map(|_| rng.sample(rand::distributions::Alphanumeric)),
    );
    bytes.shuffle(&mut rng);
    bytes.into_iter().map(char::from).collect()
}

/// Runtime behavior flags
#[derive(Debug, Clone)]
pub struct RuntimeFlags {
    /// Leave resources running after the benchmark
    pub keep: bool,
    /// Overall bound on prepare and run
    pub run_timeout: Option<Duration>,
    /// Output JSON file path
    pub output: Option<PathBuf>,
    /// Readiness polling interval and bound
    pub ready_wait: WaitConfig,
    /// Post-delete absence polling interval and bound
    pub delete_wait: WaitConfig,
}

impl Default for RuntimeFlags {
    fn default() -> Self {
        Self {
            keep: false,
            run_timeout: None,
            output: None,
            ready_wait: WaitConfig::readiness(),
            delete_wait: WaitConfig::deletion(),
        }
    }
}

/// Configuration for a benchmark run, built once at startup
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub spec: BenchmarkSpec,
    pub flags: RuntimeFlags,
}

impl RunConfig {
    pub fn run_uri(&self) -> &RunUri {
        &self.spec.run_uri
    }
    pub fn cloud(&self) -> Cloud {
        self.spec.cloud
    }
    pub fn benchmark(&self) -> &str {
        &self.spec.name
    }
    pub fn keep(&self) -> bool {
        self.flags.keep
    }
    pub fn output(&self) -> Option<&Path> {
        self.flags.output.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DEFAULTS: &str = r#"
demo:
  description: demo benchmark
  managed_relational_db:
    database: postgres
    vm_spec:
      Azure:
        machine_type:
          cpus: 4
          memory: 16GiB
        zone: eastus
      GCP:
        machine_type:
          cpus: 16
          memory: 54GiB
        zone: us-central1-c
    disk_spec:
      Azure:
        disk_size: 128
      GCP:
        disk_size: 1000
        disk_type: pd-ssd
  vm_groups:
    default:
      vm_spec:
        Azure:
          machine_type: Standard_D4s_v3
          zone: eastus
        GCP:
          machine_type: n1-standard-16
      disk_spec:
        Azure:
          disk_size: 50
  workload:
    clients: 16
"#;

    fn uri() -> RunUri {
        RunUri::parse("abc123").unwrap()
    }

    #[test]
    fn test_merge_yaml_is_deep() {
        let mut base: Value = serde_yaml::from_str("a: {b: 1, c: 2}\nd: 3").unwrap();
        let overlay: Value = serde_yaml::from_str("a: {c: 20, e: 5}\nd: [1]").unwrap();
        merge_yaml(&mut base, overlay);
        let expected: Value = serde_yaml::from_str("a: {b: 1, c: 20, e: 5}\nd: [1]").unwrap();
        assert_eq!(base, expected);
    }

    #[test]
    fn test_resolve_for_azure() {
        let tree = YamlSpecSource::new().load("demo", DEFAULTS).unwrap();
        let spec =
            BenchmarkSpec::resolve("demo", tree, Cloud::Azure, &uri(), &SpecOverrides::default())
                .unwrap();

        let db = spec.database.as_ref().unwrap();
        assert_eq!(db.engine, DatabaseEngine::Postgres);
        assert_eq!(db.vm.machine_type.cpus(), Some(4));
        assert_eq!(db.disk.disk_size, 128);
        assert_eq!(db.database_name, "cloudbench-db-abc123");
        assert_eq!(db.username, "cloudbench_abc123");
        assert_eq!(db.password.len(), DEFAULT_PASSWORD_LENGTH);
        assert_eq!(db.version, None);

        let group = &spec.vm_groups["default"];
        assert_eq!(group.vm.machine_type.name(), Some("Standard_D4s_v3"));
        assert_eq!(group.disk.as_ref().unwrap().disk_size, 50);
        assert_eq!(spec.primary_zone(), Some("eastus"));
        assert_eq!(spec.workload["clients"].as_u64(), Some(16));
    }

    #[test]
    fn test_cli_overrides_win() {
        let tree = YamlSpecSource::new().load("demo", DEFAULTS).unwrap();
        let overrides = SpecOverrides {
            database_username: Some("admin_user".into()),
            database_password: Some("Sup3rSecret".into()),
            database_version: Some("10".into()),
            data_disk_size: Some(256),
            high_availability: Some(true),
            zone: Some("westeurope".into()),
            ..Default::default()
        };
        let spec = BenchmarkSpec::resolve("demo", tree, Cloud::Azure, &uri(), &overrides).unwrap();
        let db = spec.database.unwrap();
        assert_eq!(db.username, "admin_user");
        assert_eq!(db.password, "Sup3rSecret");
        assert_eq!(db.version.as_deref(), Some("10"));
        assert_eq!(db.disk.disk_size, 256);
        assert!(db.high_availability);
        assert_eq!(db.vm.zone, "westeurope");
        assert_eq!(spec.vm_groups["default"].vm.zone, "westeurope");
    }

    #[test]
    fn test_user_yaml_overlays_defaults() {
        let source = YamlSpecSource::with_user_yaml(
            "demo:\n  managed_relational_db:\n    disk_spec:\n      Azure:\n        disk_size: 512\n",
            "test",
        )
        .unwrap();
        let tree = source.load("demo", DEFAULTS).unwrap();
        let spec =
            BenchmarkSpec::resolve("demo", tree, Cloud::Azure, &uri(), &SpecOverrides::default())
                .unwrap();
        assert_eq!(spec.database.unwrap().disk.disk_size, 512);
    }

    #[test]
    fn test_missing_zone_is_reported() {
        // GCP vm group has no zone and none was given on the command line
        let tree = YamlSpecSource::new().load("demo", DEFAULTS).unwrap();
        let err =
            BenchmarkSpec::resolve("demo", tree, Cloud::Gcp, &uri(), &SpecOverrides::default())
                .unwrap_err();
        assert!(matches!(err, ConfigError::MissingSection { .. }));
    }

    #[test]
    fn test_missing_provider_section() {
        let tree = YamlSpecSource::new().load("demo", DEFAULTS).unwrap();
        let err =
            BenchmarkSpec::resolve("demo", tree, Cloud::Aws, &uri(), &SpecOverrides::default())
                .unwrap_err();
        assert!(err.to_string().contains("managed_relational_db.vm_spec.Aws"));
    }

    #[test]
    fn test_short_password_fails_validation() {
        let tree = YamlSpecSource::new().load("demo", DEFAULTS).unwrap();
        let overrides = SpecOverrides {
            database_password: Some("short".into()),
            ..Default::default()
        };
        let err = BenchmarkSpec::resolve("demo", tree, Cloud::Azure, &uri(), &overrides)
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));
    }

    #[test]
    fn test_unknown_section() {
        let err = YamlSpecSource::new().load("other", DEFAULTS).unwrap_err();
        assert!(matches!(err, ConfigError::MissingSection { .. }));
    }

    #[test]
    fn test_generated_password_classes() {
        for _ in 0..20 {
            let password = generate_password();
            assert_eq!(password.len(), DEFAULT_PASSWORD_LENGTH);
            assert!(password.chars().any(|c| c.is_ascii_uppercase()));
            assert!(password.chars().any(|c| c.is_ascii_lowercase()));
            assert!(password.chars().any(|c| c.is_ascii_digit()));
        }
    }

    #[test]
    fn test_overrides_debug_redacts_password() {
        let overrides = SpecOverrides {
            database_password: Some("hunter22".into()),
            ..Default::default()
        };
        assert!(!format!("{overrides:?}").contains("hunter22"));
    }
}
