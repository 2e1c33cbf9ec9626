use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use crate::type_library::locate_type_library;

const SAVE_PREFIX: &str = "save_";
const STATS_PREFIX: &str = "Stats_";

/// `Save_<N>.data` keeps progression; run history lives in the paired
/// `Stats_<N>.data` next to it. Stats paths map to themselves.
pub fn stats_path_for_save(save_path: &Path) -> Option<PathBuf> {
    let name = save_path.file_name()?.to_str()?;
    if name
        .get(..STATS_PREFIX.len())
        .is_some_and(|p| p.eq_ignore_ascii_case(STATS_PREFIX))
    {
        return Some(save_path.to_path_buf());
    }
    let prefix = name.get(..SAVE_PREFIX.len())?;
    if !prefix.eq_ignore_ascii_case(SAVE_PREFIX) {
        return None;
    }
    let rest = &name[SAVE_PREFIX.len()..];
    let slot = rest.split('.').next().unwrap_or(rest);
    if slot.is_empty() || !slot.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    Some(save_path.with_file_name(format!("{STATS_PREFIX}{rest}")))
}

/// Walk up from a save file looking for a game install that ships a type
/// library, for installs that keep saves inside the game folder.
pub fn detect_install_dir_from_save_path(save_path: &Path) -> Option<PathBuf> {
    let mut candidates = Vec::new();
    if let Some(parent) = save_path.parent() {
        candidates.extend(parent.ancestors().map(Path::to_path_buf));
    }
    if let Ok(canonical) = fs::canonicalize(save_path)
        && let Some(parent) = canonical.parent()
    {
        candidates.extend(parent.ancestors().map(Path::to_path_buf));
    }
    first_install_dir(candidates)
}

/// Default Steam install locations under a home directory.
pub fn conventional_install_dirs(home: &Path) -> Vec<PathBuf> {
    const STEAM_ROOTS: [&[&str]; 4] = [
        &[".steam", "steam"],
        &[".local", "share", "Steam"],
        &["Library", "Application Support", "Steam"],
        &["scoop", "apps", "steam", "current"],
    ];
    let mut dirs: Vec<PathBuf> = STEAM_ROOTS
        .iter()
        .map(|parts| {
            parts
                .iter()
                .fold(home.to_path_buf(), |path, part| path.join(part))
                .join("steamapps")
                .join("common")
                .join("Peglin")
        })
        .collect();
    dirs.push(PathBuf::from(
        r"C:\Program Files (x86)\Steam\steamapps\common\Peglin",
    ));
    dirs
}

/// First candidate that contains a type library, skipping duplicates.
pub fn first_install_dir<I>(candidates: I) -> Option<PathBuf>
where
    I: IntoIterator<Item = PathBuf>,
{
    let mut seen = BTreeSet::new();
    for candidate in candidates {
        if !seen.insert(candidate.clone()) {
            continue;
        }
        if candidate.is_dir() && locate_type_library(&candidate).is_some() {
            return Some(candidate);
        }
    }
    None
}
