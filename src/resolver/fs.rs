//! Filesystem-backed resolver.

use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};
use std::time::{SystemTime, UNIX_EPOCH};

use super::{Content, Resolver, ResolverError};
use crate::config::ResourceConfig;

/// Serves files indexed from a page root and a media directory.
///
/// - `/` maps to the home page
/// - files under the root are served without their extension
///   (`root/about.html` → `/about`), except `favicon.*`
/// - files under the media directory keep their extension
#[derive(Debug)]
pub struct FileResolver {
    urls: RwLock<BTreeMap<String, PathBuf>>,
    media: PathBuf,
}

impl FileResolver {
    /// Index `config.root` and `config.media`.
    pub fn new(config: &ResourceConfig) -> Result<Self, ResolverError> {
        for path in [&config.root, &config.home_page, &config.media] {
            if !path.exists() {
                return Err(ResolverError::NotFound(path.display().to_string()));
            }
        }

        let mut urls = BTreeMap::new();
        index_dir(&config.root, false, &mut urls)?;
        index_dir(&config.media, true, &mut urls)?;
        urls.insert("/".to_string(), config.home_page.clone());

        tracing::debug!(
            resources = urls.len(),
            root = %config.root.display(),
            media = %config.media.display(),
            "Resources indexed"
        );

        Ok(Self {
            urls: RwLock::new(urls),
            media: config.media.clone(),
        })
    }

    fn lookup(&self, path: &str) -> Option<PathBuf> {
        self.urls
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(path)
            .cloned()
    }

    /// Claim a media file name for an upload.
    ///
    /// A name is taken when its URL is already indexed or the file exists.
    /// The file is created with `create_new`, so two uploads racing for the
    /// same name cannot both win.
    fn reserve(&self, filename: Option<&str>) -> Result<(String, File), ResolverError> {
        let requested = filename
            .and_then(|name| Path::new(name).file_name())
            .and_then(|name| name.to_str())
            .filter(|name| !name.is_empty());

        let suffix = requested
            .and_then(|name| Path::new(name).extension())
            .and_then(|ext| ext.to_str())
            .map(|ext| format!(".{}", ext))
            .unwrap_or_else(|| ".bin".to_string());
        let stamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis();
        let generated = (0u64..).map(|n| match n {
            0 => format!("{}{}", stamp, suffix),
            n => format!("{}-{}{}", stamp, n, suffix),
        });

        let urls = self.urls.read().unwrap_or_else(PoisonError::into_inner);
        for name in requested.map(str::to_string).into_iter().chain(generated) {
            if urls.contains_key(&format!("/{}", name)) {
                continue;
            }
            match OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(self.media.join(&name))
            {
                Ok(file) => return Ok((name, file)),
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Err(ResolverError::Io(io::Error::new(
            io::ErrorKind::AlreadyExists,
            "no free upload name",
        )))
    }
}

impl Resolver for FileResolver {
    fn contains(&self, path: &str) -> bool {
        self.urls
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(path)
    }

    fn content(&self, path: &str) -> Result<Content, ResolverError> {
        let file = self
            .lookup(path)
            .ok_or_else(|| ResolverError::NotFound(path.to_string()))?;

        if Path::new(path).extension().is_some() {
            Ok(Content::Binary(fs::read(file)?))
        } else {
            Ok(Content::Text(fs::read_to_string(file)?))
        }
    }

    fn media_links(&self) -> Vec<String> {
        self.urls
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .filter(|url| {
                Path::new(url.as_str())
                    .extension()
                    .is_some_and(|ext| ext.to_str() != Some("ico"))
            })
            .cloned()
            .collect()
    }

    fn save_upload(&self, data: &[u8], filename: Option<&str>) -> Result<String, ResolverError> {
        let (name, mut file) = self.reserve(filename)?;
        let path = self.media.join(&name);
        if let Err(e) = file.write_all(data).and_then(|()| file.flush()) {
            let _ = fs::remove_file(&path);
            return Err(e.into());
        }

        let url = format!("/{}", name);
        self.urls
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(url.clone(), path);
        tracing::info!(url = %url, bytes = data.len(), "Upload saved");
        Ok(url)
    }
}

/// Walk `root` and add every file to `urls`.
fn index_dir(
    root: &Path,
    keep_extension: bool,
    urls: &mut BTreeMap<String, PathBuf>,
) -> Result<(), ResolverError> {
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.is_dir() {
                stack.push(path);
                continue;
            }
            if let Some(url) = url_for(root, &path, keep_extension) {
                urls.insert(url, path);
            }
        }
    }
    Ok(())
}

fn url_for(root: &Path, file: &Path, keep_extension: bool) -> Option<String> {
    let relative = file.strip_prefix(root).ok()?;
    let mut parts: Vec<String> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();

    let stem = file.file_stem()?.to_string_lossy();
    if !keep_extension && stem != "favicon" {
        let last = parts.last_mut()?;
        *last = stem.into_owned();
    }
    Some(format!("/{}", parts.join("/")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn site() -> (TempDir, FileResolver) {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("root");
        let media = dir.path().join("media");
        fs::create_dir_all(root.join("docs")).unwrap();
        fs::create_dir_all(&media).unwrap();
        fs::write(root.join("index.html"), "<h1>home</h1>").unwrap();
        fs::write(root.join("logger_name.html"), "<p>Hello, {}</p>").unwrap();
        fs::write(root.join("docs/guide.html"), "guide").unwrap();
        fs::write(root.join("favicon.ico"), [0u8, 1, 2]).unwrap();
        fs::write(media.join("cat.jpg"), [0xFFu8, 0xD8]).unwrap();

        let config = ResourceConfig {
            home_page: root.join("index.html"),
            root,
            media,
        };
        let resolver = FileResolver::new(&config).unwrap();
        (dir, resolver)
    }

    #[test]
    fn indexes_pages_without_extension() {
        let (_dir, resolver) = site();
        assert!(resolver.contains("/"));
        assert!(resolver.contains("/index"));
        assert!(resolver.contains("/logger_name"));
        assert!(resolver.contains("/docs/guide"));
        assert!(resolver.contains("/favicon.ico"));
        assert!(resolver.contains("/cat.jpg"));
        assert!(!resolver.contains("/index.html"));
        assert!(!resolver.contains("/missing"));
    }

    #[test]
    fn text_and_binary_content() {
        let (_dir, resolver) = site();
        assert_eq!(
            resolver.content("/").unwrap(),
            Content::Text("<h1>home</h1>".into())
        );
        assert_eq!(
            resolver.content("/cat.jpg").unwrap(),
            Content::Binary(vec![0xFF, 0xD8])
        );
        assert!(matches!(
            resolver.content("/nope"),
            Err(ResolverError::NotFound(_))
        ));
    }

    #[test]
    fn media_links_skip_icons() {
        let (_dir, resolver) = site();
        assert_eq!(resolver.media_links(), vec!["/cat.jpg".to_string()]);
    }

    #[test]
    fn upload_is_visible_and_never_overwrites() {
        let (_dir, resolver) = site();

        let url = resolver.save_upload(b"new", Some("dog.png")).unwrap();
        assert_eq!(url, "/dog.png");
        assert!(resolver.contains("/dog.png"));
        assert_eq!(resolver.content("/dog.png").unwrap(), Content::Binary(b"new".to_vec()));

        let renamed = resolver.save_upload(b"other", Some("cat.jpg")).unwrap();
        assert_ne!(renamed, "/cat.jpg");
        assert!(renamed.ends_with(".jpg"));
        assert_eq!(resolver.content("/cat.jpg").unwrap(), Content::Binary(vec![0xFF, 0xD8]));
        assert!(resolver.media_links().contains(&renamed));
    }

    #[test]
    fn upload_cannot_replace_indexed_pages() {
        let (_dir, resolver) = site();

        for name in ["logger_name", "index", "favicon.ico"] {
            let url = resolver.save_upload(b"HIJACKED {}", Some(name)).unwrap();
            assert_ne!(url, format!("/{}", name));
        }
        assert_eq!(
            resolver.content("/logger_name").unwrap(),
            Content::Text("<p>Hello, {}</p>".into())
        );
        assert_eq!(
            resolver.content("/index").unwrap(),
            Content::Text("<h1>home</h1>".into())
        );
        assert_eq!(
            resolver.content("/favicon.ico").unwrap(),
            Content::Binary(vec![0, 1, 2])
        );
    }

    #[test]
    fn concurrent_uploads_claim_distinct_names() {
        let (_dir, resolver) = site();
        let resolver = std::sync::Arc::new(resolver);

        let handles: Vec<_> = (0..8u8)
            .map(|i| {
                let resolver = std::sync::Arc::clone(&resolver);
                std::thread::spawn(move || resolver.save_upload(&[i], Some("same.png")).unwrap())
            })
            .collect();
        let mut urls: Vec<String> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        urls.sort();
        urls.dedup();

        assert_eq!(urls.len(), 8);
        assert!(urls.contains(&"/same.png".to_string()));
        for url in &urls {
            assert!(matches!(resolver.content(url).unwrap(), Content::Binary(ref b) if b.len() == 1));
        }
    }

    #[test]
    fn upload_without_name_gets_generated_one() {
        let (_dir, resolver) = site();
        let url = resolver.save_upload(b"x", None).unwrap();
        assert!(url.ends_with(".bin"));
        assert!(resolver.contains(&url));
        let second = resolver.save_upload(b"y", None).unwrap();
        assert_ne!(url, second);
    }

    #[test]
    fn suggested_name_cannot_escape_media_dir() {
        let (_dir, resolver) = site();
        let url = resolver.save_upload(b"x", Some("../../evil.gif")).unwrap();
        assert_eq!(url, "/evil.gif");
    }

    #[test]
    fn missing_root_is_rejected() {
        let config = ResourceConfig {
            root: "/no/such/root".into(),
            home_page: "/no/such/root/index.html".into(),
            media: "/no/such/media".into(),
        };
        assert!(matches!(
            FileResolver::new(&config),
            Err(ResolverError::NotFound(_))
        ));
    }
}
