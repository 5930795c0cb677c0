//! IP address management: a per-subnet bitmap allocator.
//!
//! Each subnet owns a bitmap of `2^(32-prefix)` ASCII `'0'`/`'1'`
//! characters, where bit `i` covers `subnet.base + (i+1)`; the gateway is
//! always the first allocation. The map from subnet to bitmap is
//! persisted as JSON with a load-mutate-save cycle per operation — there
//! is no cross-process locking.

use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::path::PathBuf;

use ipnetwork::Ipv4Network;
use tinybox_common::constants;
use tinybox_common::error::{Result, TinyboxError};
use tinybox_common::util;

/// Bitmap address allocator over a JSON state file.
pub struct Ipam {
    path: PathBuf,
}

impl Default for Ipam {
    fn default() -> Self {
        Self::new(constants::DEFAULT_SUBNET_PATH)
    }
}

impl Ipam {
    /// Creates an allocator backed by the given state file.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Allocates the lowest free address in the subnet.
    ///
    /// # Errors
    ///
    /// Returns `ResourceExhausted` when the subnet's bitmap is fully set,
    /// or an I/O error from the state file.
    pub fn allocate(&self, subnet: &Ipv4Network) -> Result<Ipv4Addr> {
        let mut subnets = self.load()?;
        let key = subnet_key(subnet);
        let bitmap = subnets
            .entry(key.clone())
            .or_insert_with(|| "0".repeat(bitmap_len(subnet)));

        let Some(index) = bitmap.find('0') else {
            return Err(TinyboxError::ResourceExhausted {
                message: format!("no allocatable ip in {key}"),
            });
        };
        bitmap.replace_range(index..=index, "1");

        let base = u32::from(subnet.network());
        let ip = Ipv4Addr::from(base + index as u32 + 1);
        self.save(&subnets)?;
        tracing::info!(subnet = %key, %ip, "address allocated");
        Ok(ip)
    }

    /// Releases a previously allocated address.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for a subnet with no bitmap, or
    /// `InvalidArgument` for an address outside the subnet.
    pub fn release(&self, subnet: &Ipv4Network, ip: Ipv4Addr) -> Result<()> {
        let mut subnets = self.load()?;
        let key = subnet_key(subnet);
        let Some(bitmap) = subnets.get_mut(&key) else {
            return Err(TinyboxError::NotFound {
                kind: "subnet",
                id: key,
            });
        };

        let base = u32::from(subnet.network());
        let index = u32::from(ip)
            .checked_sub(base)
            .and_then(|offset| offset.checked_sub(1))
            .map(|i| i as usize)
            .filter(|i| *i < bitmap.len())
            .ok_or_else(|| TinyboxError::InvalidArgument {
                message: format!("{ip} is not an allocatable address of {key}"),
            })?;
        bitmap.replace_range(index..=index, "0");

        self.save(&subnets)?;
        tracing::info!(subnet = %key, %ip, "address released");
        Ok(())
    }

    /// Drops a subnet's bitmap entirely (used when its network is
    /// deleted). Unknown subnets are ignored.
    ///
    /// # Errors
    ///
    /// Returns an I/O error from the state file.
    pub fn remove_subnet(&self, subnet: &Ipv4Network) -> Result<()> {
        let mut subnets = self.load()?;
        if subnets.remove(&subnet_key(subnet)).is_some() {
            self.save(&subnets)?;
        }
        Ok(())
    }

    /// Loads the state map; a missing file is an empty map.
    fn load(&self) -> Result<HashMap<String, String>> {
        if !self.path.exists() {
            return Ok(HashMap::new());
        }
        let body = std::fs::read_to_string(&self.path).map_err(|e| TinyboxError::Io {
            path: self.path.clone(),
            source: e,
        })?;
        Ok(serde_json::from_str(&body)?)
    }

    fn save(&self, subnets: &HashMap<String, String>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            util::ensure_directory(parent)?;
        }
        let body = serde_json::to_string(subnets)?;
        std::fs::write(&self.path, body).map_err(|e| TinyboxError::Io {
            path: self.path.clone(),
            source: e,
        })
    }
}

/// Canonical map key for a subnet: the masked network address in CIDR
/// notation.
fn subnet_key(subnet: &Ipv4Network) -> String {
    format!("{}/{}", subnet.network(), subnet.prefix())
}

fn bitmap_len(subnet: &Ipv4Network) -> usize {
    1usize << (32 - subnet.prefix())
}
