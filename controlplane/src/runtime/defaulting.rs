//! Defaulting of process inputs
//!
//! Turns the optional fields of a process configuration into concrete
//! values. A value supplied by the caller always wins; only unset (or empty)
//! fields receive defaults.

use crate::error::{FixtureError, FixtureResult};
use crate::runtime::addr;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;
use url::Url;

pub const DEFAULT_START_TIMEOUT: Duration = Duration::from_secs(20);
pub const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// Prefix of every data directory the fixtures create
pub const TEMP_DIR_PREFIX: &str = "k8s_test_framework_";

/// Directory searched for binaries before `./assets/bin` and `PATH`
pub const ASSETS_DIR_ENV: &str = "TEST_ASSETS_DIR";

/// Relative directory searched for binaries
pub const LOCAL_ASSETS_DIR: &str = "assets/bin";

/// A data directory, either borrowed from the caller or owned by the fixture
#[derive(Debug)]
pub struct DataDir {
    path: PathBuf,
    owned: Option<TempDir>,
}

impl DataDir {
    /// Reference a directory the caller manages
    pub fn borrowed<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            path: path.into(),
            owned: None,
        }
    }

    /// Create a fresh unique directory owned by the fixture
    pub fn create() -> FixtureResult<Self> {
        let dir = tempfile::Builder::new()
            .prefix(TEMP_DIR_PREFIX)
            .tempdir()
            .map_err(|source| FixtureError::DataDir {
                operation: "create".to_string(),
                path: std::env::temp_dir(),
                source,
            })?;

        Ok(Self {
            path: dir.path().to_path_buf(),
            owned: Some(dir),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether this directory is removed on cleanup
    pub fn is_owned(&self) -> bool {
        self.owned.is_some()
    }

    /// Remove the directory if the fixture created it; borrowed ones are left alone
    pub fn cleanup(&mut self) -> FixtureResult<()> {
        match self.owned.take() {
            Some(dir) => dir.close().map_err(|source| FixtureError::DataDir {
                operation: "remove".to_string(),
                path: self.path.clone(),
                source,
            }),
            None => Ok(()),
        }
    }
}

/// Fully resolved input for one managed process
#[derive(Debug)]
pub struct DefaultedProcessInput {
    pub url: Url,
    pub dir: DataDir,
    pub path: PathBuf,
    pub start_timeout: Duration,
    pub stop_timeout: Duration,
}

/// Resolve every unset field of a process configuration
///
/// The binary is resolved before any directory is created so that a missing
/// binary never leaves a stray directory behind.
pub fn do_defaulting(
    name: &str,
    bind_url: Option<&str>,
    data_dir: Option<&Path>,
    path: Option<&Path>,
    start_timeout: Option<Duration>,
    stop_timeout: Option<Duration>,
) -> FixtureResult<DefaultedProcessInput> {
    let url = match bind_url.map(str::trim).filter(|u| !u.is_empty()) {
        Some(raw) => parse_bind_url(name, raw)?,
        None => suggested_url()?,
    };

    let path = match path.filter(|p| !p.as_os_str().is_empty()) {
        Some(p) => ensure_executable(name, p)?,
        None => {
            if name.is_empty() {
                return Err(FixtureError::MissingBinaryName);
            }
            bin_path_finder(name)?
        }
    };

    let dir = match data_dir.filter(|d| !d.as_os_str().is_empty()) {
        Some(d) => DataDir::borrowed(d),
        None => DataDir::create()?,
    };

    Ok(DefaultedProcessInput {
        url,
        dir,
        path,
        start_timeout: non_zero_or(start_timeout, DEFAULT_START_TIMEOUT),
        stop_timeout: non_zero_or(stop_timeout, DEFAULT_STOP_TIMEOUT),
    })
}

fn non_zero_or(value: Option<Duration>, default: Duration) -> Duration {
    value.filter(|d| !d.is_zero()).unwrap_or(default)
}

/// Parse a caller-supplied bind URL; it must name a host and a port
pub fn parse_bind_url(component: &str, raw: &str) -> FixtureResult<Url> {
    let invalid = |reason: String| FixtureError::InvalidBindUrl {
        component: component.to_string(),
        url: raw.to_string(),
        reason,
    };

    let url = Url::parse(raw).map_err(|e| invalid(e.to_string()))?;
    if url.host_str().map_or(true, str::is_empty) {
        return Err(invalid("missing host".to_string()));
    }
    if url.port_or_known_default().is_none() {
        return Err(invalid("missing port".to_string()));
    }
    Ok(url)
}

fn suggested_url() -> FixtureResult<Url> {
    let (port, host) = addr::suggest()?;
    let raw = format!("http://{host}:{port}");
    Url::parse(&raw).map_err(|e| FixtureError::InvalidBindUrl {
        component: String::new(),
        url: raw,
        reason: e.to_string(),
    })
}

/// Environment variable that points directly at the binary for `name`
///
/// `kube-apiserver` becomes `TEST_ASSET_KUBE_APISERVER`.
pub fn asset_env_var(name: &str) -> String {
    let suffix: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_uppercase() } else { '_' })
        .collect();
    format!("TEST_ASSET_{suffix}")
}

/// Locate the binary for `name` using the process environment
pub fn bin_path_finder(name: &str) -> FixtureResult<PathBuf> {
    find_binary(name, |key| std::env::var_os(key))
}

/// Locate the binary for `name`, reading variables through `lookup`
///
/// Order: `TEST_ASSET_<NAME>`, `$TEST_ASSETS_DIR/<name>`, `./assets/bin/<name>`,
/// then every `PATH` entry.
pub fn find_binary<F>(name: &str, lookup: F) -> FixtureResult<PathBuf>
where
    F: Fn(&str) -> Option<OsString>,
{
    let env_var = asset_env_var(name);
    if let Some(explicit) = lookup(&env_var).filter(|v| !v.is_empty()) {
        return ensure_executable(name, Path::new(&explicit)).map_err(|_| FixtureError::BinaryNotFound {
            component: name.to_string(),
            details: format!("{env_var} points to {:?}, which is not an executable file", explicit),
        });
    }

    let mut candidates = Vec::new();
    if let Some(dir) = lookup(ASSETS_DIR_ENV).filter(|v| !v.is_empty()) {
        candidates.push(PathBuf::from(dir).join(name));
    }
    candidates.push(Path::new(LOCAL_ASSETS_DIR).join(name));
    if let Some(paths) = lookup("PATH") {
        candidates.extend(std::env::split_paths(&paths).map(|dir| dir.join(name)));
    }

    candidates
        .into_iter()
        .find(|candidate| is_executable(candidate))
        .ok_or_else(|| FixtureError::BinaryNotFound {
            component: name.to_string(),
            details: format!("set {env_var} or {ASSETS_DIR_ENV}, or put {name} in {LOCAL_ASSETS_DIR} or on PATH"),
        })
}

fn ensure_executable(component: &str, path: &Path) -> FixtureResult<PathBuf> {
    if is_executable(path) {
        Ok(path.to_path_buf())
    } else {
        Err(FixtureError::BinaryNotFound {
            component: component.to_string(),
            details: format!("{} does not exist or is not executable", path.display()),
        })
    }
}

/// Whether `path` is a regular file the current user may execute
pub fn is_executable(path: &Path) -> bool {
    let Ok(metadata) = std::fs::metadata(path) else {
        return false;
    };
    if !metadata.is_file() {
        return false;
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        metadata.permissions().mode() & 0o111 != 0
    }
    #[cfg(not(unix))]
    {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[cfg(unix)]
    fn write_executable(dir: &Path, name: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;
        let path = dir.join(name);
        std::fs::write(&path, "#!/bin/sh\nexit 0\n").unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn env(vars: Vec<(&str, OsString)>) -> impl Fn(&str) -> Option<OsString> {
        let map: HashMap<String, OsString> = vars.into_iter().map(|(k, v)| (k.to_string(), v)).collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_asset_env_var_name() {
        assert_eq!(asset_env_var("etcd"), "TEST_ASSET_ETCD");
        assert_eq!(asset_env_var("kube-apiserver"), "TEST_ASSET_KUBE_APISERVER");
    }

    #[test]
    fn test_parse_bind_url_accepts_host_and_port() {
        let url = parse_bind_url("etcd", "http://127.0.0.1:2379").unwrap();
        assert_eq!(url.port(), Some(2379));
        assert_eq!(url.host_str(), Some("127.0.0.1"));
    }

    #[test]
    fn test_parse_bind_url_rejects_garbage() {
        let err = parse_bind_url("etcd", "not a url").unwrap_err();
        assert!(err.is_configuration());
        assert!(matches!(err, FixtureError::InvalidBindUrl { .. }));

        // Parses as scheme "localhost" with no host at all.
        let err = parse_bind_url("etcd", "localhost:2379").unwrap_err();
        assert!(matches!(err, FixtureError::InvalidBindUrl { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn test_defaulting_fills_every_unset_field() {
        let bin_dir = tempfile::tempdir().unwrap();
        let binary = write_executable(bin_dir.path(), "etcd");

        let input = do_defaulting("etcd", None, None, Some(&binary), None, None).unwrap();

        assert_eq!(input.url.scheme(), "http");
        assert_eq!(input.url.host_str(), Some(addr::LOCAL_HOST));
        assert!(input.url.port().is_some());
        assert!(input.dir.is_owned());
        assert!(input.dir.path().is_dir());
        assert!(
            input
                .dir
                .path()
                .file_name()
                .unwrap()
                .to_string_lossy()
                .starts_with(TEMP_DIR_PREFIX)
        );
        assert_eq!(input.path, binary);
        assert_eq!(input.start_timeout, DEFAULT_START_TIMEOUT);
        assert_eq!(input.stop_timeout, DEFAULT_STOP_TIMEOUT);
    }

    #[cfg(unix)]
    #[test]
    fn test_defaulting_keeps_caller_values() {
        let bin_dir = tempfile::tempdir().unwrap();
        let binary = write_executable(bin_dir.path(), "etcd");
        let data_dir = tempfile::tempdir().unwrap();

        let input = do_defaulting(
            "etcd",
            Some("http://localhost:12379"),
            Some(data_dir.path()),
            Some(&binary),
            Some(Duration::from_secs(3)),
            Some(Duration::from_secs(1)),
        )
        .unwrap();

        assert_eq!(input.url.as_str(), "http://localhost:12379/");
        assert_eq!(input.dir.path(), data_dir.path());
        assert!(!input.dir.is_owned());
        assert_eq!(input.start_timeout, Duration::from_secs(3));
        assert_eq!(input.stop_timeout, Duration::from_secs(1));
    }

    #[test]
    fn test_zero_timeouts_are_defaulted() {
        assert_eq!(non_zero_or(Some(Duration::ZERO), DEFAULT_STOP_TIMEOUT), DEFAULT_STOP_TIMEOUT);
        assert_eq!(non_zero_or(None, DEFAULT_START_TIMEOUT), DEFAULT_START_TIMEOUT);
    }

    #[test]
    fn test_missing_binary_is_configuration_error() {
        let err = do_defaulting("etcd", None, None, Some(Path::new("/nonexistent/etcd")), None, None).unwrap_err();
        assert!(err.is_configuration());
        assert!(matches!(err, FixtureError::BinaryNotFound { .. }));
    }

    #[test]
    fn test_missing_name_and_path() {
        let err = do_defaulting("", None, None, None, None, None).unwrap_err();
        assert!(matches!(err, FixtureError::MissingBinaryName));
    }

    #[test]
    fn test_borrowed_dir_survives_cleanup() {
        let dir = tempfile::tempdir().unwrap();
        let mut data_dir = DataDir::borrowed(dir.path());
        data_dir.cleanup().unwrap();
        assert!(dir.path().is_dir());
    }

    #[test]
    fn test_owned_dir_removed_on_cleanup() {
        let mut data_dir = DataDir::create().unwrap();
        let path = data_dir.path().to_path_buf();
        assert!(path.is_dir());

        data_dir.cleanup().unwrap();
        assert!(!path.exists());
        // second cleanup is a no-op
        data_dir.cleanup().unwrap();
    }

    #[cfg(unix)]
    #[test]
    fn test_find_binary_prefers_explicit_env_var() {
        let explicit_dir = tempfile::tempdir().unwrap();
        let explicit = write_executable(explicit_dir.path(), "my-etcd");
        let path_dir = tempfile::tempdir().unwrap();
        write_executable(path_dir.path(), "etcd");

        let found = find_binary(
            "etcd",
            env(vec![
                ("TEST_ASSET_ETCD", explicit.clone().into_os_string()),
                ("PATH", path_dir.path().as_os_str().to_os_string()),
            ]),
        )
        .unwrap();

        assert_eq!(found, explicit);
    }

    #[cfg(unix)]
    #[test]
    fn test_find_binary_searches_assets_dir_then_path() {
        let assets = tempfile::tempdir().unwrap();
        let in_assets = write_executable(assets.path(), "kube-apiserver");
        let path_dir = tempfile::tempdir().unwrap();
        let on_path = write_executable(path_dir.path(), "kubectl");

        let lookup = env(vec![
            (ASSETS_DIR_ENV, assets.path().as_os_str().to_os_string()),
            ("PATH", path_dir.path().as_os_str().to_os_string()),
        ]);

        assert_eq!(find_binary("kube-apiserver", &lookup).unwrap(), in_assets);
        assert_eq!(find_binary("kubectl", &lookup).unwrap(), on_path);
    }

    #[test]
    fn test_find_binary_reports_broken_env_var() {
        let err = find_binary(
            "etcd",
            env(vec![("TEST_ASSET_ETCD", OsString::from("/nonexistent/etcd"))]),
        )
        .unwrap_err();

        match err {
            FixtureError::BinaryNotFound { details, .. } => assert!(details.contains("TEST_ASSET_ETCD")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_non_executable_file_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("etcd");
        std::fs::write(&path, "not a program").unwrap();
        assert!(!is_executable(&path));
        assert!(!is_executable(dir.path()));
    }
}
