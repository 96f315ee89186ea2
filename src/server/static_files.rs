//! Request-target resolution beneath the served root.
//!
//! The invariant everything here protects: a request can never read bytes
//! from outside the configured root directory. Targets are percent-decoded,
//! joined onto the root, canonicalized, and prefix-checked against the
//! canonical root before any file is opened.

use std::fs;
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};

/// What a request target resolved to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolved {
    /// A regular file to stream (possibly a directory's `index.html`).
    File(PathBuf),
    /// A directory without an index file; render a listing.
    Listing(PathBuf),
    /// A directory requested without its trailing slash; redirect to the
    /// slash-terminated location so relative links resolve against it.
    Redirect(String),
}

/// Resolves a raw request target against the root directory.
///
/// # Errors
/// `NotFound` for missing paths, `PermissionDenied` for paths escaping the
/// root, `InvalidInput` for targets that are not valid percent-encoded UTF-8.
pub fn resolve(target: &str, root: &Path) -> io::Result<Resolved> {
    // the query string and fragment play no part in file lookup
    let path = target
        .split(['?', '#'])
        .next()
        .unwrap_or_default();

    let decoded = percent_decode(path)
        .ok_or_else(|| io::Error::new(ErrorKind::InvalidInput, "undecodable request target"))?;
    if decoded.contains('\0') {
        return Err(io::Error::new(ErrorKind::InvalidInput, "NUL in request target"));
    }

    let relative = decoded.trim_start_matches('/');
    let requested = if relative.is_empty() {
        root.to_path_buf()
    } else {
        root.join(relative)
    };

    // canonicalization collapses any `..` segments, so a traversal attempt
    // shows up as a path outside the canonical root
    let canonical = requested.canonicalize()?;
    let canonical_root = root.canonicalize()?;
    if !canonical.starts_with(&canonical_root) {
        return Err(ErrorKind::PermissionDenied.into());
    }

    if canonical.is_file() {
        return Ok(Resolved::File(canonical));
    }

    if canonical.is_dir() {
        // a browser resolves relative links against everything up to the
        // last slash, so a listing or index served at `/sub` would have its
        // links point at the parent; send the client to `/sub/` first
        if !relative.is_empty() && !decoded.ends_with('/') {
            let location = match target.split_once('?') {
                Some((base, query)) => format!("{base}/?{query}"),
                None => format!("{path}/"),
            };
            return Ok(Resolved::Redirect(location));
        }
        let index = canonical.join("index.html");
        if index.is_file() {
            return Ok(Resolved::File(index));
        }
        return Ok(Resolved::Listing(canonical));
    }

    Err(ErrorKind::NotFound.into())
}

/// Renders the fallback HTML listing for a directory without an index file.
pub fn render_listing(dir: &Path, request_path: &str) -> io::Result<String> {
    let mut entries: Vec<(String, bool)> = fs::read_dir(dir)?
        .filter_map(Result::ok)
        .map(|entry| {
            let is_dir = entry.path().is_dir();
            (entry.file_name().to_string_lossy().into_owned(), is_dir)
        })
        .collect();
    entries.sort();

    let title = escape_html(request_path);
    let mut body = format!(
        "<!DOCTYPE html>\n<html>\n<head><title>Directory listing for {title}</title></head>\n\
         <body>\n<h1>Directory listing for {title}</h1>\n<hr>\n<ul>\n"
    );
    for (name, is_dir) in entries {
        let display = if is_dir { format!("{name}/") } else { name };
        let escaped = escape_html(&display);
        body.push_str(&format!("<li><a href=\"{escaped}\">{escaped}</a></li>\n"));
    }
    body.push_str("</ul>\n<hr>\n</body>\n</html>\n");
    Ok(body)
}

/// Best-effort content type from the file extension.
///
/// Covers the types a local web-app directory actually contains; everything
/// else is served as an opaque byte stream.
pub fn content_type(path: &Path) -> &'static str {
    let Some(extension) = path.extension().and_then(|ext| ext.to_str()) else {
        return "application/octet-stream";
    };
    match extension {
        "html" | "htm" => "text/html",
        "css" => "text/css",
        "js" | "mjs" => "text/javascript",
        "json" => "application/json",
        "xml" => "application/xml",
        "txt" => "text/plain",
        "md" => "text/markdown",
        "csv" => "text/csv",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "svg" => "image/svg+xml",
        "ico" => "image/x-icon",
        "pdf" => "application/pdf",
        "wasm" => "application/wasm",
        "zip" => "application/zip",
        "gz" => "application/gzip",
        _ => "application/octet-stream",
    }
}

fn percent_decode(input: &str) -> Option<String> {
    let mut bytes = Vec::with_capacity(input.len());
    let mut iter = input.bytes();
    while let Some(byte) = iter.next() {
        if byte == b'%' {
            let hex = [iter.next()?, iter.next()?];
            let hex = std::str::from_utf8(&hex).ok()?;
            bytes.push(u8::from_str_radix(hex, 16).ok()?);
        } else {
            bytes.push(byte);
        }
    }
    String::from_utf8(bytes).ok()
}

fn escape_html(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            other => escaped.push(other),
        }
    }
    escaped
}
