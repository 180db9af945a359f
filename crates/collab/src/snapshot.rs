//! Base snapshot codec.
//!
//! The first replica to sync an empty room captures its scene once,
//! serialized and brotli-compressed; every later replica bootstraps by
//! decoding this blob and folding the log over it.

use std::io::{Read, Write};

use serde::{Deserialize, Serialize};
use shared::Scene;

use crate::{CollabError, Result};

const BROTLI_BUFFER: usize = 4096;
const BROTLI_QUALITY: u32 = 5;
const BROTLI_WINDOW: u32 = 22;

/// Compressed serialized scene used to bootstrap new replicas
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaseSnapshot {
    pub data: Vec<u8>,
}

impl BaseSnapshot {
    /// Serialize and compress a scene, one shot
    pub fn capture(scene: &Scene) -> Result<Self> {
        let json = serde_json::to_vec(scene)?;
        let mut data = Vec::new();
        {
            let mut writer =
                brotli::CompressorWriter::new(&mut data, BROTLI_BUFFER, BROTLI_QUALITY, BROTLI_WINDOW);
            writer.write_all(&json)?;
        }
        Ok(Self { data })
    }

    /// Decompress and deserialize; corrupt blobs surface as errors so the
    /// caller can fall back to the default scene
    pub fn decode(&self) -> Result<Scene> {
        let mut json = Vec::new();
        brotli::Decompressor::new(self.data.as_slice(), BROTLI_BUFFER)
            .read_to_end(&mut json)
            .map_err(|e| CollabError::SnapshotDecode(e.to_string()))?;
        serde_json::from_slice(&json).map_err(|e| CollabError::SnapshotDecode(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::{SceneObject, SceneStep};

    #[test]
    fn test_capture_decode_roundtrip() {
        let mut scene = Scene::default();
        scene.next_id = 4;
        scene.steps = vec![SceneStep {
            objects: vec![
                SceneObject::Rect {
                    id: 1,
                    x: 1.0,
                    y: 2.0,
                    width: 3.0,
                    height: 4.0,
                },
                SceneObject::Tether {
                    id: 2,
                    start_id: 1,
                    end_id: 3,
                },
            ],
        }];
        let snap = BaseSnapshot::capture(&scene).unwrap();
        assert_eq!(snap.decode().unwrap(), scene);
    }

    #[test]
    fn test_compression_actually_shrinks() {
        let mut scene = Scene::default();
        for id in 1..200u64 {
            scene.steps[0].objects.push(SceneObject::Circle {
                id,
                x: 0.0,
                y: 0.0,
                radius: 1.0,
            });
        }
        let snap = BaseSnapshot::capture(&scene).unwrap();
        let json_len = serde_json::to_vec(&scene).unwrap().len();
        assert!(snap.data.len() < json_len);
    }

    #[test]
    fn test_corrupt_blob_is_an_error_not_a_panic() {
        let snap = BaseSnapshot {
            data: vec![0xde, 0xad, 0xbe, 0xef, 0x01, 0x02],
        };
        assert!(snap.decode().is_err());
    }

    #[test]
    fn test_valid_brotli_wrong_payload_is_an_error() {
        let mut data = Vec::new();
        {
            let mut writer = brotli::CompressorWriter::new(&mut data, 4096, 5, 22);
            writer.write_all(b"not a scene").unwrap();
        }
        let snap = BaseSnapshot { data };
        assert!(snap.decode().is_err());
    }
}
