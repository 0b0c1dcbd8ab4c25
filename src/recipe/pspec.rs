use crate::types::{HashAlgorithm, Package, RecipeKind, Source};
use std::path::PathBuf;

/// An element found by [`elements`]: its raw attribute text and inner text.
struct Element<'a> {
    attrs: &'a str,
    inner: &'a str,
}

/// Non-nested occurrences of `<tag ...>...</tag>` in `text`, in order.
fn elements<'a>(text: &'a str, tag: &str) -> Vec<Element<'a>> {
    let open = format!("<{}", tag);
    let close = format!("</{}>", tag);
    let mut found = Vec::new();
    let mut rest = text;

    while let Some(start) = rest.find(&open) {
        let after = &rest[start + open.len()..];
        // `<Name` must not match `<NameSpace`
        if !after.starts_with(['>', ' ', '\t', '\n', '\r', '/']) {
            rest = after;
            continue;
        }
        let Some(gt) = after.find('>') else {
            break;
        };
        let attrs = after[..gt].trim_end_matches('/');
        if after[..gt].ends_with('/') {
            found.push(Element { attrs, inner: "" });
            rest = &after[gt + 1..];
            continue;
        }
        let body = &after[gt + 1..];
        let Some(end) = body.find(&close) else {
            break;
        };
        found.push(Element {
            attrs,
            inner: &body[..end],
        });
        rest = &body[end + close.len()..];
    }
    found
}

fn first<'a>(text: &'a str, tag: &str) -> Option<Element<'a>> {
    elements(text, tag).into_iter().next()
}

fn attribute(attrs: &str, name: &str) -> Option<String> {
    let mut rest = attrs;
    while let Some(idx) = rest.find(name) {
        let before_ok = idx == 0
            || rest[..idx].ends_with(char::is_whitespace);
        let after = rest[idx + name.len()..].trim_start();
        if before_ok {
            if let Some(value) = after.strip_prefix('=') {
                let value = value.trim_start();
                let quote = value.chars().next()?;
                if quote == '"' || quote == '\'' {
                    let value = &value[1..];
                    let end = value.find(quote)?;
                    return Some(unescape(&value[..end]));
                }
            }
        }
        rest = &rest[idx + name.len()..];
    }
    None
}

fn unescape(text: &str) -> String {
    text.trim()
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

/// Parse the parts of a legacy `pspec.xml` needed to stage a build: the
/// source name and archives, and the newest history entry.
pub(super) fn parse(content: &str) -> Result<Package, String> {
    let source = first(content, "Source").ok_or("missing <Source>")?;
    let name = first(source.inner, "Name")
        .map(|e| unescape(e.inner))
        .filter(|n| !n.is_empty())
        .ok_or("missing <Source>/<Name>")?;

    let mut sources = Vec::new();
    for archive in elements(source.inner, "Archive") {
        let uri = unescape(archive.inner);
        let hash = attribute(archive.attrs, "sha1sum")
            .ok_or_else(|| format!("archive {} has no sha1sum", uri))?;
        sources.push(Source::new(&uri, &hash, HashAlgorithm::Sha1)?);
    }

    let history = first(content, "History").ok_or("missing <History>")?;
    let update =
        first(history.inner, "Update").ok_or("missing <History>/<Update>")?;
    let release = attribute(update.attrs, "release")
        .ok_or("missing release attribute on <Update>")?;
    let release = release
        .parse::<u32>()
        .map_err(|_| format!("invalid release '{}'", release))?;
    let version = first(update.inner, "Version")
        .map(|e| unescape(e.inner))
        .filter(|v| !v.is_empty())
        .ok_or("missing <Update>/<Version>")?;

    Ok(Package {
        name,
        version,
        release,
        kind: RecipeKind::Legacy,
        path: PathBuf::new(),
        sources,
        can_network: false,
    })
}
