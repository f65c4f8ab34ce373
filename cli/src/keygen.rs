//! Pod member key files

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use tessera_threshold::encoding::base64_array;
use tessera_threshold::{LocalPodMember, PodMember};

#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;

/// On-disk member key
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyFile {
    #[serde(with = "base64_array")]
    pub secret_key: [u8; 32],
    #[serde(with = "base64_array")]
    pub public_key: [u8; 32],
}

impl KeyFile {
    pub fn member(&self) -> LocalPodMember {
        LocalPodMember::from_secret(self.secret_key)
    }
}

/// Default key location: ~/.tessera/member.json
pub fn default_key_path() -> Result<PathBuf> {
    let home = dirs::home_dir().context("Could not determine home directory")?;
    Ok(home.join(".tessera").join("member.json"))
}

/// Generate a member key, refusing to overwrite an existing file.
///
/// Returns the directory entry to publish for this member.
pub fn generate(path: &Path, address: Option<String>) -> Result<PodMember> {
    if path.exists() {
        bail!(
            "File {} already exists. Remove it first or use a different path.",
            path.display()
        );
    }

    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        if !dir.exists() {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create {}", dir.display()))?;

            #[cfg(unix)]
            {
                // rwx------
                let mut perms = fs::metadata(dir)?.permissions();
                perms.set_mode(0o700);
                fs::set_permissions(dir, perms)?;
            }
        }
    }

    let member = LocalPodMember::generate(&mut rand::rngs::OsRng);
    let key = KeyFile {
        secret_key: member.secret_bytes(),
        public_key: *member.public_key.as_bytes(),
    };
    let json = serde_json::to_string_pretty(&key)?;

    let mut f = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;

    #[cfg(unix)]
    {
        // rw-------
        let mut perms = f.metadata()?.permissions();
        perms.set_mode(0o600);
        fs::set_permissions(path, perms)?;
    }

    f.write_all(json.as_bytes())?;

    let entry = member.to_member();
    Ok(match address {
        Some(address) => entry.with_address(address),
        None => entry,
    })
}

pub fn load(path: &Path) -> Result<KeyFile> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read key file: {}", path.display()))?;
    let key: KeyFile = serde_json::from_str(&raw)
        .with_context(|| format!("Failed to parse key file: {}", path.display()))?;

    if key.member().public_key.as_bytes() != &key.public_key {
        bail!("Key file {} has a mismatched public key", path.display());
    }
    Ok(key)
}
