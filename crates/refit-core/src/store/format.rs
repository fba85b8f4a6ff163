// On-disk layout of a compiled rule blob:
//
//   magic (6 bytes) | format version (u16, little endian) | bincode envelope
//
// Readers reject any version other than FORMAT_VERSION.

use serde::{Deserialize, Serialize};

use super::StoreError;
use crate::migration::MigrationRulePair;
use crate::rule::Rule;

pub const MAGIC: &[u8; 6] = b"REFIT\0";
pub const FORMAT_VERSION: u16 = 1;

const HEADER_LEN: usize = MAGIC.len() + 2;

/// Envelope around every persisted artifact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CompiledArtifact {
    Rule(Rule),
    Migration(MigrationRulePair),
}

impl CompiledArtifact {
    pub fn name(&self) -> &str {
        match self {
            CompiledArtifact::Rule(rule) => &rule.name,
            CompiledArtifact::Migration(pair) => &pair.name,
        }
    }
}

pub fn encode(artifact: &CompiledArtifact) -> Result<Vec<u8>, StoreError> {
    let body = bincode::serialize(artifact)?;
    let mut bytes = Vec::with_capacity(HEADER_LEN + body.len());
    bytes.extend_from_slice(MAGIC);
    bytes.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
    bytes.extend_from_slice(&body);
    Ok(bytes)
}

pub fn decode(resource: &str, bytes: &[u8]) -> Result<CompiledArtifact, StoreError> {
    if bytes.len() < HEADER_LEN || &bytes[..MAGIC.len()] != MAGIC {
        return Err(StoreError::BadMagic {
            resource: resource.to_string(),
        });
    }
    let version = u16::from_le_bytes([bytes[MAGIC.len()], bytes[MAGIC.len() + 1]]);
    if version != FORMAT_VERSION {
        return Err(StoreError::UnsupportedVersion {
            resource: resource.to_string(),
            version,
        });
    }
    Ok(bincode::deserialize(&bytes[HEADER_LEN..])?)
}
