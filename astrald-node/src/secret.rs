use anyhow::{Context as _, Result};
use astrald_identity::Identity;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use structopt::StructOpt;

#[derive(Debug, PartialEq, Eq, Hash, Clone, Serialize, Deserialize, StructOpt)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// path to this node's persisted secret key
    #[structopt(long = "identity", default_value = "identity.key", env = "ASTRALD_IDENTITY_FILE")]
    #[serde(default = "default_identity_file")]
    pub identity: PathBuf,
}

fn default_identity_file() -> PathBuf {
    PathBuf::from("identity.key")
}

impl Default for Config {
    fn default() -> Self {
        Self {
            identity: default_identity_file(),
        }
    }
}

/// this node's own identity, generated on first start and persisted
/// under `config.identity` afterward
///
/// simpler than a passphrase-protected entropy file: the secret key
/// bytes are written directly, relying on filesystem permissions
/// (mode `0600`) rather than a second factor to protect them at rest.
pub fn load(config: Config) -> Result<Identity> {
    if config.identity.exists() {
        read(&config.identity)
    } else {
        let identity = Identity::generate(OsRng);
        write(&config.identity, &identity)?;
        tracing::info!(public = %identity, path = %config.identity.display(), "generated new identity");
        Ok(identity)
    }
}

fn read(path: &Path) -> Result<Identity> {
    let bytes =
        std::fs::read(path).with_context(|| format!("cannot read identity file: {}", path.display()))?;
    let identity = Identity::from_secret_bytes(&bytes)
        .with_context(|| format!("identity file is corrupt: {}", path.display()))?;
    tracing::info!(public = %identity, "loaded identity");
    Ok(identity)
}

fn write(path: &Path, identity: &Identity) -> Result<()> {
    let bytes = identity
        .to_secret_bytes()
        .context("freshly generated identity has no secret key")?;
    std::fs::write(path, &bytes)
        .with_context(|| format!("cannot write identity file: {}", path.display()))?;
    set_private_permissions(path)?;
    Ok(())
}

#[cfg(unix)]
fn set_private_permissions(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
        .with_context(|| format!("cannot set permissions on: {}", path.display()))
}

#[cfg(not(unix))]
fn set_private_permissions(_path: &Path) -> Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generates_then_reloads_the_same_identity() {
        let dir = std::env::temp_dir().join(format!("astrald-node-test-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("identity.key");

        let config = Config {
            identity: path.clone(),
        };
        let first = load(config.clone()).unwrap();
        let second = load(config).unwrap();

        assert_eq!(first.public_key(), second.public_key());

        std::fs::remove_dir_all(&dir).ok();
    }
}
