use std::collections::HashMap;
use std::path::Path;

use tracing::debug;
use walkdir::WalkDir;

/// Shown whenever no artwork can be found for a name. Missing artwork is
/// cosmetic and must never fail a roll.
pub const PLACEHOLDER_IMAGE: &str = "placeholder.png";

const IMAGE_EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "gif"];

pub trait ImageResolver {
    /// Image reference for a species or item name, if one is known.
    fn resolve(&self, name: &str) -> Option<String>;
}

/// Resolver for builds with no artwork directory at all.
#[derive(Debug, Default)]
pub struct NullImageResolver;

impl ImageResolver for NullImageResolver {
    fn resolve(&self, _name: &str) -> Option<String> {
        None
    }
}

/// Indexes an artwork directory once, matching file stems to names
/// case-insensitively. Subdirectories are walked so art can be organised
/// per source table.
#[derive(Debug)]
pub struct DirImageResolver {
    by_stem: HashMap<String, String>,
}

impl DirImageResolver {
    pub fn new(root: &Path) -> Self {
        let mut by_stem = HashMap::new();
        for entry in WalkDir::new(root)
            .follow_links(true)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
        {
            let path = entry.path();
            let is_image = path
                .extension()
                .and_then(|e| e.to_str())
                .map_or(false, |ext| {
                    IMAGE_EXTENSIONS.iter().any(|i| i.eq_ignore_ascii_case(ext))
                });
            if !is_image {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                by_stem
                    .entry(normalise(stem))
                    .or_insert_with(|| path.display().to_string());
            }
        }
        debug!(root = %root.display(), images = by_stem.len(), "indexed artwork directory");
        Self { by_stem }
    }
}

impl ImageResolver for DirImageResolver {
    fn resolve(&self, name: &str) -> Option<String> {
        self.by_stem.get(&normalise(name)).cloned()
    }
}

/// Artwork filenames drop punctuation and spacing that species names carry.
fn normalise(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}
