// aegis-push/src/package/icons.rs

use std::path::{Component, Path};

/// Directory inside the push package that holds the icons.
pub const ICONSET_DIR: &str = "icon.iconset";

/// The resolutions Safari requires, as file names inside [`ICONSET_DIR`].
pub const REQUIRED_ICONS: [&str; 6] = [
    "icon_16x16.png",
    "icon_16x16@2x.png",
    "icon_32x32.png",
    "icon_32x32@2x.png",
    "icon_128x128.png",
    "icon_128x128@2x.png",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Icon {
    /// Relative name inside the package, e.g. `icon.iconset/icon_16x16.png`.
    pub name: String,
    pub bytes: Vec<u8>,
}

/// Ordered, read-only icon files copied verbatim into every package.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IconSet {
    icons: Vec<Icon>,
}

impl IconSet {
    pub fn new(icons: impl IntoIterator<Item = (String, Vec<u8>)>) -> Self {
        Self {
            icons: icons
                .into_iter()
                .map(|(name, bytes)| Icon { name, bytes })
                .collect(),
        }
    }

    /// Reads every required icon from `dir`, keeping the [`REQUIRED_ICONS`] order.
    pub fn load(dir: &Path) -> std::io::Result<Self> {
        let mut icons = Vec::with_capacity(REQUIRED_ICONS.len());
        for file in REQUIRED_ICONS {
            let path = dir.join(file);
            let bytes = std::fs::read(&path).map_err(|e| {
                std::io::Error::new(e.kind(), format!("{}: {e}", path.display()))
            })?;
            icons.push(Icon {
                name: format!("{ICONSET_DIR}/{file}"),
                bytes,
            });
        }
        Ok(Self { icons })
    }

    pub fn iter(&self) -> impl Iterator<Item = &Icon> {
        self.icons.iter()
    }

    pub fn len(&self) -> usize {
        self.icons.len()
    }

    pub fn is_empty(&self) -> bool {
        self.icons.is_empty()
    }
}

/// True when `name` stays inside the package root once joined to it and is
/// already in the `/`-separated form the manifest records.
pub(crate) fn is_safe_member_name(name: &str) -> bool {
    let mut normalized = Vec::new();
    for component in Path::new(name).components() {
        match component {
            Component::Normal(part) => match part.to_str() {
                Some(part) => normalized.push(part),
                None => return false,
            },
            _ => return false,
        }
    }
    !normalized.is_empty() && normalized.join("/") == name
}
