//! Site-level outputs: the version manifest, the root redirect, and the
//! directory scan used after deployment.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use docfleet_shared::{DocfleetError, Result, VersionEntry, VersionSpec};

/// File name of the version-switcher manifest.
pub const MANIFEST_FILE: &str = "versions.json";

/// File name of the root redirect page.
pub const REDIRECT_FILE: &str = "index.html";

/// Write `versions.json` listing every configured version, in order.
#[instrument(skip_all, fields(root = %output_root.display(), versions = versions.len()))]
pub fn write_manifest(output_root: &Path, versions: &[VersionSpec]) -> Result<PathBuf> {
    let entries: Vec<VersionEntry> = versions.iter().map(VersionEntry::from).collect();
    let path = output_root.join(MANIFEST_FILE);
    write_json(&path, &entries)?;
    info!(path = %path.display(), "created versions manifest");
    Ok(path)
}

/// Write the root `index.html` redirecting to `<default_version>/`.
#[instrument(skip_all, fields(root = %output_root.display(), target = %default_version))]
pub fn write_redirect(output_root: &Path, default_version: &str, title: &str) -> Result<PathBuf> {
    let path = output_root.join(REDIRECT_FILE);
    atomic_write(&path, &redirect_html(default_version, title))?;
    info!(path = %path.display(), "created root redirect");
    Ok(path)
}

fn redirect_html(target: &str, title: &str) -> String {
    let target = escape_html(target);
    let title = escape_html(title);
    format!(
        r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="utf-8">
    <meta http-equiv="refresh" content="0; url={target}/">
    <link rel="canonical" href="{target}/">
    <title>{title}</title>
    <style>
        body {{
            font-family: -apple-system, BlinkMacSystemFont, "Segoe UI", Roboto, sans-serif;
            display: flex;
            align-items: center;
            justify-content: center;
            height: 100vh;
            margin: 0;
        }}
        .container {{ text-align: center; }}
    </style>
</head>
<body>
    <div class="container">
        <h1>{title}</h1>
        <p>Redirecting to <a href="{target}/">{target}</a>...</p>
        <p><small>If not redirected, click the link above.</small></p>
    </div>
</body>
</html>
"#
    )
}

/// Enough for the redirect page: text content and double-quoted attribute
/// values. Not a general-purpose HTML escaper.
fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Directory scan
// ---------------------------------------------------------------------------

/// One deployed version directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuiltVersion {
    pub name: String,
    pub url: String,
}

/// `{"versions": [...]}` as served next to deployed builds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuiltVersions {
    pub versions: Vec<BuiltVersion>,
}

/// Immediate subdirectories of `root`, sorted by name. A missing root yields
/// an empty list.
pub fn scan_built_versions(root: &Path) -> Result<BuiltVersions> {
    if !root.is_dir() {
        return Ok(BuiltVersions::default());
    }

    let mut names: Vec<String> = std::fs::read_dir(root)
        .map_err(|e| DocfleetError::io(root, e))?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.path().is_dir())
        .filter_map(|entry| entry.file_name().to_str().map(String::from))
        .collect();
    names.sort();

    Ok(BuiltVersions {
        versions: names
            .into_iter()
            .map(|name| BuiltVersion {
                url: format!("/{name}/"),
                name,
            })
            .collect(),
    })
}

// ---------------------------------------------------------------------------
// Writing
// ---------------------------------------------------------------------------

fn write_json<T: Serialize>(path: &Path, data: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(data)
        .map_err(|e| DocfleetError::validation(format!("JSON serialization failed: {e}")))?;
    atomic_write(path, &json)
}

/// Write to a sibling temp file, then rename over `path`.
fn atomic_write(path: &Path, content: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| DocfleetError::io(parent, e))?;
    }
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let temp = path.with_file_name(format!(".{file_name}.tmp"));
    std::fs::write(&temp, content).map_err(|e| DocfleetError::io(&temp, e))?;
    std::fs::rename(&temp, path).map_err(|e| DocfleetError::io(path, e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("docfleet-site-test-{}", uuid::Uuid::now_v7()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn version(name: &str, display: Option<&str>, preferred: bool) -> VersionSpec {
        VersionSpec {
            reference: format!("v{name}"),
            name: name.into(),
            display_name: display.map(String::from),
            url_path: format!("/{name}/"),
            preferred,
        }
    }

    #[test]
    fn manifest_lists_all_versions_in_order() {
        let tmp = temp_dir();
        let versions = vec![
            version("latest", Some("Latest (main)"), true),
            version("2.0", None, false),
        ];

        let path = write_manifest(&tmp, &versions).unwrap();
        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(
            json,
            serde_json::json!([
                {"name": "Latest (main)", "version": "latest", "url": "/latest/", "preferred": true},
                {"name": "2.0", "version": "2.0", "url": "/2.0/", "preferred": false}
            ])
        );
        assert!(!tmp.join(".versions.json.tmp").exists());

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn manifest_is_stable_across_runs() {
        let tmp = temp_dir();
        let versions = vec![version("a", None, false), version("b", None, true)];

        let first = std::fs::read_to_string(write_manifest(&tmp, &versions).unwrap()).unwrap();
        let second = std::fs::read_to_string(write_manifest(&tmp, &versions).unwrap()).unwrap();
        assert_eq!(first, second);

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn redirect_points_at_default() {
        let tmp = temp_dir();
        let path = write_redirect(&tmp, "develop", "Docs & <More>").unwrap();
        let html = std::fs::read_to_string(path).unwrap();
        assert!(html.contains(r#"content="0; url=develop/""#));
        assert!(html.contains(r#"<a href="develop/">develop</a>"#));
        assert!(html.contains("<title>Docs &amp; &lt;More&gt;</title>"));

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn scan_sorts_directories_and_ignores_files() {
        let tmp = temp_dir();
        for dir in ["v2", "latest", "v10"] {
            std::fs::create_dir_all(tmp.join(dir)).unwrap();
        }
        std::fs::write(tmp.join("versions.json"), "[]").unwrap();

        let scanned = scan_built_versions(&tmp).unwrap();
        let names: Vec<&str> = scanned.versions.iter().map(|v| v.name.as_str()).collect();
        assert_eq!(names, vec!["latest", "v10", "v2"]);
        assert_eq!(scanned.versions[0].url, "/latest/");

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn scan_of_missing_root_is_empty() {
        let missing = std::env::temp_dir().join(format!("docfleet-site-none-{}", uuid::Uuid::now_v7()));
        let scanned = scan_built_versions(&missing).unwrap();
        assert!(scanned.versions.is_empty());
        assert_eq!(serde_json::to_string(&scanned).unwrap(), r#"{"versions":[]}"#);
    }
}
