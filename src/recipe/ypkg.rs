use crate::types::{HashAlgorithm, Package, RecipeKind, Source};
use std::path::PathBuf;

fn unquote(value: &str) -> &str {
    let value = value.trim();
    for quote in ['"', '\''] {
        if let Some(inner) = value
            .strip_prefix(quote)
            .and_then(|v| v.strip_suffix(quote))
        {
            return inner;
        }
    }
    value
}

fn strip_comment(line: &str) -> &str {
    match line.find(" #") {
        Some(idx) => &line[..idx],
        None if line.trim_start().starts_with('#') => "",
        None => line,
    }
}

/// Parse the subset of `package.yml` needed to stage a build: the identity
/// keys, `networking` and the `source` list.
pub(super) fn parse(content: &str) -> Result<Package, String> {
    let mut name = None;
    let mut version = None;
    let mut release = None;
    let mut can_network = false;
    let mut sources = Vec::new();
    let mut in_sources = false;

    for (lineno, raw) in content.lines().enumerate() {
        let line = strip_comment(raw);
        if line.trim().is_empty() {
            continue;
        }

        let indented = line.starts_with(char::is_whitespace);
        if indented {
            if !in_sources {
                continue;
            }
            let Some(item) = line.trim().strip_prefix('-') else {
                continue;
            };
            let Some((uri, hash)) = item.rsplit_once(':') else {
                return Err(format!(
                    "line {}: source entry without a hash",
                    lineno + 1
                ));
            };
            let (uri, hash) = (unquote(uri), unquote(hash));
            if uri.is_empty() || hash.is_empty() {
                return Err(format!("line {}: empty source entry", lineno + 1));
            }
            let source = Source::new(uri, hash, HashAlgorithm::Sha256)
                .map_err(|e| format!("line {}: {}", lineno + 1, e))?;
            sources.push(source);
            continue;
        }

        in_sources = false;
        let Some((key, value)) = line.split_once(':') else {
            return Err(format!("line {}: expected `key : value`", lineno + 1));
        };
        let value = unquote(value);

        match key.trim() {
            "name" => name = Some(value.to_string()),
            "version" => version = Some(value.to_string()),
            "release" => {
                release = Some(value.parse::<u32>().map_err(|_| {
                    format!("line {}: invalid release '{}'", lineno + 1, value)
                })?)
            }
            "networking" => {
                can_network = matches!(value, "yes" | "true" | "on")
            }
            "source" => in_sources = true,
            _ => {}
        }
    }

    Ok(Package {
        name: name.ok_or("missing name")?,
        version: version.ok_or("missing version")?,
        release: release.ok_or("missing release")?,
        kind: RecipeKind::Modern,
        path: PathBuf::new(),
        sources,
        can_network,
    })
}
