//! Gesture library.
//!
//! A category directory holds one two-line text file per gesture (open
//! pose, close pose; 16 joint angles each, canonical order) plus an
//! optional `_type_info.json` with display metadata used by intent
//! resolution. Profiles are immutable once loaded; the catalog itself is
//! read once at startup.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{HandError, HandResult};
use crate::joints::{JointMap, Pose, JOINT_COUNT};

pub const META_FILE: &str = "_type_info.json";

/// Descriptive metadata for one gesture, as stored in `_type_info.json`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GestureMeta {
    pub id: String,
    #[serde(default)]
    pub name: String,
    /// Short description of the pose, shown to the classifier.
    #[serde(default, alias = "pose")]
    pub description: String,
    /// Longer usage notes, mined for keyword bonuses.
    #[serde(default)]
    pub usage: String,
    #[serde(default)]
    pub intents: Vec<String>,
}

/// Named (open, close) pose pair in absolute hardware positions.
#[derive(Debug, Clone, PartialEq)]
pub struct GestureProfile {
    pub id: String,
    pub open: Pose,
    pub close: Pose,
}

/// Read-only gesture catalog for one category.
pub struct GestureCatalog {
    dir: PathBuf,
    entries: Vec<GestureMeta>,
    joints: JointMap,
}

impl GestureCatalog {
    /// Load the catalog for `category` under `root`.
    ///
    /// When `_type_info.json` is absent or unreadable the catalog falls
    /// back to listing `.txt` stems with empty metadata.
    pub fn load(root: &Path, category: &str) -> HandResult<Self> {
        let dir = root.join(category);
        if !dir.is_dir() {
            return Err(HandError::Config(format!(
                "Gesture library directory not found: {}",
                dir.display()
            )));
        }

        let meta_path = dir.join(META_FILE);
        let mut entries: Vec<GestureMeta> = Vec::new();

        if meta_path.exists() {
            match fs::read_to_string(&meta_path)
                .map_err(HandError::from)
                .and_then(|s| serde_json::from_str::<Vec<GestureMeta>>(&s).map_err(HandError::from))
            {
                Ok(parsed) => entries = parsed.into_iter().filter(|m| !m.id.is_empty()).collect(),
                Err(e) => warn!("Failed to read {}: {}", meta_path.display(), e),
            }
        }

        if entries.is_empty() {
            for entry in fs::read_dir(&dir)? {
                let path = entry?.path();
                if path.extension().is_some_and(|ext| ext == "txt") {
                    if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                        entries.push(GestureMeta {
                            id: stem.to_string(),
                            ..Default::default()
                        });
                    }
                }
            }
            entries.sort_by(|a, b| a.id.cmp(&b.id));
        }

        info!(
            "Loaded gesture catalog '{}': {:?}",
            category,
            entries.iter().map(|e| e.id.as_str()).collect::<Vec<_>>()
        );

        Ok(Self {
            dir,
            entries,
            joints: JointMap::new(),
        })
    }

    pub fn entries(&self) -> &[GestureMeta] {
        &self.entries
    }

    pub fn ids(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.id.clone()).collect()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.iter().any(|e| e.id == id)
    }

    /// Load and decode one gesture profile into hardware positions.
    pub fn load_profile(&self, id: &str) -> HandResult<GestureProfile> {
        let path = self.dir.join(format!("{}.txt", id));
        if !path.exists() {
            return Err(HandError::UnknownGesture(id.to_string()));
        }

        let content = fs::read_to_string(&path)?;
        let mut lines = content.lines().filter(|l| !l.trim().is_empty());

        let open_line = lines.next().ok_or_else(|| malformed(id, "missing open pose line"))?;
        let close_line = lines.next().ok_or_else(|| malformed(id, "missing close pose line"))?;

        let open = self.joints.to_hardware(&parse_pose_line(id, open_line)?);
        let close = self.joints.to_hardware(&parse_pose_line(id, close_line)?);

        Ok(GestureProfile {
            id: id.to_string(),
            open,
            close,
        })
    }

    /// Write a recorded profile (canonical-order poses) as a two-line file.
    /// Fails if the gesture exists and `overwrite` is false.
    pub fn save_profile(
        &self,
        id: &str,
        open_canonical: &Pose,
        close_canonical: &Pose,
        overwrite: bool,
    ) -> HandResult<PathBuf> {
        if id.trim().is_empty() {
            return Err(HandError::Config("gesture name cannot be empty".into()));
        }
        let path = self.dir.join(format!("{}.txt", id));
        if path.exists() && !overwrite {
            return Err(HandError::Config(format!("gesture '{}' already exists", id)));
        }

        let format_line = |pose: &Pose| {
            pose.iter()
                .map(|v| v.to_string())
                .collect::<Vec<_>>()
                .join(" ")
        };
        let content = format!("{}\n{}\n", format_line(open_canonical), format_line(close_canonical));
        fs::write(&path, content)?;
        Ok(path)
    }
}

fn malformed(id: &str, reason: &str) -> HandError {
    HandError::MalformedProfile {
        name: id.to_string(),
        reason: reason.to_string(),
    }
}

/// Parse one pose line: 16 floats, whitespace or comma separated,
/// optional surrounding brackets.
fn parse_pose_line(id: &str, line: &str) -> HandResult<Pose> {
    let cleaned = line.trim().trim_start_matches('[').trim_end_matches(']');
    let values: Vec<f64> = cleaned
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|p| !p.is_empty())
        .map(|p| {
            p.parse::<f64>()
                .map_err(|_| malformed(id, &format!("invalid number '{}'", p)))
        })
        .collect::<HandResult<_>>()?;

    if values.len() != JOINT_COUNT {
        return Err(malformed(
            id,
            &format!("expected {} joints, got {}", JOINT_COUNT, values.len()),
        ));
    }

    let mut pose = [0.0; JOINT_COUNT];
    pose.copy_from_slice(&values);
    Ok(pose)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::joints::HARDWARE_OFFSET;
    use tempfile::TempDir;

    fn write_catalog(dir: &TempDir) -> PathBuf {
        let cat = dir.path().join("leap");
        fs::create_dir_all(&cat).unwrap();
        let zeros = vec!["0.0"; JOINT_COUNT].join(" ");
        let ones = vec!["1.0"; JOINT_COUNT].join(", ");
        fs::write(cat.join("boxgrasp.txt"), format!("[{}]\n[{}]\n", zeros, ones)).unwrap();
        fs::write(cat.join("pinch.txt"), format!("{}\n{}\n", zeros, zeros)).unwrap();
        dir.path().to_path_buf()
    }

    #[test]
    fn test_load_without_metadata_lists_txt_stems() {
        let tmp = TempDir::new().unwrap();
        let root = write_catalog(&tmp);
        let catalog = GestureCatalog::load(&root, "leap").unwrap();
        assert_eq!(catalog.ids(), vec!["boxgrasp", "pinch"]);
        assert!(catalog.contains("pinch"));
        assert!(!catalog.contains("fist"));
    }

    #[test]
    fn test_metadata_file_takes_precedence() {
        let tmp = TempDir::new().unwrap();
        let root = write_catalog(&tmp);
        let meta = r#"[
            {"id": "boxgrasp", "name": "box grasp", "pose": "power grasp around a box",
             "usage": "grab medium rigid objects", "intents": ["grab", "hold"]}
        ]"#;
        fs::write(root.join("leap").join(META_FILE), meta).unwrap();

        let catalog = GestureCatalog::load(&root, "leap").unwrap();
        assert_eq!(catalog.ids(), vec!["boxgrasp"]);
        let entry = &catalog.entries()[0];
        assert_eq!(entry.description, "power grasp around a box");
        assert_eq!(entry.intents, vec!["grab", "hold"]);
    }

    #[test]
    fn test_profile_decodes_to_hardware_positions() {
        let tmp = TempDir::new().unwrap();
        let root = write_catalog(&tmp);
        let catalog = GestureCatalog::load(&root, "leap").unwrap();

        let profile = catalog.load_profile("boxgrasp").unwrap();
        for v in profile.open {
            assert!((v - HARDWARE_OFFSET).abs() < 1e-9);
        }
        for v in profile.close {
            assert!((v - (1.0 + HARDWARE_OFFSET)).abs() < 1e-9);
        }
    }

    #[test]
    fn test_unknown_gesture() {
        let tmp = TempDir::new().unwrap();
        let root = write_catalog(&tmp);
        let catalog = GestureCatalog::load(&root, "leap").unwrap();
        assert!(matches!(
            catalog.load_profile("fist"),
            Err(HandError::UnknownGesture(_))
        ));
    }

    #[test]
    fn test_malformed_profile_is_rejected() {
        let tmp = TempDir::new().unwrap();
        let root = write_catalog(&tmp);
        let cat = root.join("leap");
        fs::write(cat.join("short.txt"), "1 2 3\n4 5 6\n").unwrap();
        fs::write(cat.join("garbage.txt"), "a b c\nd e f\n").unwrap();

        let catalog = GestureCatalog::load(&root, "leap").unwrap();
        assert!(matches!(
            catalog.load_profile("short"),
            Err(HandError::MalformedProfile { .. })
        ));
        assert!(matches!(
            catalog.load_profile("garbage"),
            Err(HandError::MalformedProfile { .. })
        ));
    }

    #[test]
    fn test_save_profile_round_trips() {
        let tmp = TempDir::new().unwrap();
        let root = write_catalog(&tmp);
        let catalog = GestureCatalog::load(&root, "leap").unwrap();

        let mut open = [0.0; JOINT_COUNT];
        let mut close = [0.0; JOINT_COUNT];
        for i in 0..JOINT_COUNT {
            open[i] = i as f64 * 0.01;
            close[i] = 1.0 - i as f64 * 0.01;
        }
        catalog.save_profile("fist", &open, &close, false).unwrap();

        let profile = catalog.load_profile("fist").unwrap();
        let map = JointMap::new();
        let back_open = map.to_canonical(&profile.open);
        for (a, b) in open.iter().zip(back_open.iter()) {
            assert!((a - b).abs() < 1e-9);
        }

        // No silent overwrite.
        assert!(catalog.save_profile("fist", &open, &close, false).is_err());
        assert!(catalog.save_profile("fist", &open, &close, true).is_ok());
    }
}
