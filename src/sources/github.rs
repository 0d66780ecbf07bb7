//! Update source backed by a GitHub-compatible releases API.
//!
//! The newest release is identified by its tag; installing it downloads the
//! release assets straight into the target directory.
use anyhow::{Context as _, Result};
use serde::Deserialize;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::{UpdateSource, parse_options};
use crate::error::SourceError;
use crate::fingerprint::VersionFingerprint;
use crate::logging::Log;

/// Registered name of this source.
pub const SOURCE_NAME: &str = "github";

/// Default API endpoint.
const DEFAULT_API_URL: &str = "https://api.github.com";

/// Releases requested per listing; the newest eligible one is used.
const RELEASES_PER_PAGE: u32 = 20;

/// Upper bound for a single HTTP exchange, including body transfer.
const HTTP_TIMEOUT: Duration = Duration::from_secs(300);

/// Suffix of in-flight downloads.
const PART_SUFFIX: &str = ".part";

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct GithubOptions {
    /// `owner/name`.
    repository: String,
    #[serde(default = "default_api_url")]
    api_url: String,
    #[serde(default)]
    token: Option<String>,
    /// Asset names to install; all assets when absent.
    #[serde(default)]
    assets: Option<Vec<String>>,
    #[serde(default)]
    include_prereleases: bool,
}

fn default_api_url() -> String {
    DEFAULT_API_URL.to_string()
}

/// A release as returned by `GET /repos/{owner}/{repo}/releases`.
#[derive(Debug, Clone, Deserialize)]
struct Release {
    tag_name: String,
    #[serde(default)]
    draft: bool,
    #[serde(default)]
    prerelease: bool,
    #[serde(default)]
    assets: Vec<Asset>,
}

#[derive(Debug, Clone, Deserialize)]
struct Asset {
    name: String,
    /// API URL; serves the binary when requested as `application/octet-stream`.
    url: String,
}

/// GitHub releases source.
#[derive(Debug, Default)]
pub struct GithubSource {
    options: Option<GithubOptions>,
    /// Release found by the last check, reused by the update.
    latest: Option<Release>,
}

impl GithubSource {
    fn options(&self) -> Result<&GithubOptions, SourceError> {
        self.options
            .as_ref()
            .ok_or_else(|| SourceError::NotConfigured(SOURCE_NAME.to_string()))
    }

    fn agent() -> ureq::Agent {
        ureq::Agent::config_builder()
            .timeout_global(Some(HTTP_TIMEOUT))
            .build()
            .into()
    }

    fn request(
        opts: &GithubOptions,
        url: &str,
        accept: &str,
    ) -> ureq::RequestBuilder<ureq::typestate::WithoutBody> {
        let mut req = Self::agent()
            .get(url)
            .header("Accept", accept)
            .header("User-Agent", concat!("updater/", env!("CARGO_PKG_VERSION")))
            .header("X-GitHub-Api-Version", "2022-11-28");
        if let Some(token) = &opts.token {
            req = req.header("Authorization", &format!("Bearer {token}"));
        }
        req
    }

    fn fetch_latest(&self) -> Result<Release> {
        let opts = self.options()?;
        let url = releases_url(opts);
        let body = Self::request(opts, &url, "application/vnd.github+json")
            .call()
            .map_err(|e| SourceError::RemoteUnavailable(format!("{url}: {e}")))?
            .body_mut()
            .read_to_string()
            .map_err(|e| SourceError::RemoteUnavailable(format!("{url}: {e}")))?;
        let releases = parse_releases(&url, &body)?;
        select_release(releases, opts.include_prereleases).ok_or_else(|| {
            SourceError::InvalidResponse {
                origin: url,
                reason: "no published release found".to_string(),
            }
            .into()
        })
    }

    fn download(opts: &GithubOptions, asset: &Asset, part: &Path) -> Result<()> {
        let mut response = Self::request(opts, &asset.url, "application/octet-stream")
            .call()
            .map_err(|e| SourceError::RemoteUnavailable(format!("{}: {e}", asset.url)))?;
        let mut file =
            File::create(part).with_context(|| format!("creating {}", part.display()))?;
        std::io::copy(&mut response.body_mut().as_reader(), &mut file)
            .with_context(|| format!("downloading {}", asset.name))?;
        file.sync_all()
            .with_context(|| format!("flushing {}", part.display()))?;
        Ok(())
    }

    /// Download every asset, tracking each path written so a failed attempt
    /// can be rolled back.
    fn install_assets(
        opts: &GithubOptions,
        assets: &[&Asset],
        target_dir: &Path,
        written: &mut Vec<PathBuf>,
        log: &dyn Log,
    ) -> Result<()> {
        for asset in assets {
            let dest = target_dir.join(&asset.name);
            let part = target_dir.join(format!("{}{PART_SUFFIX}", asset.name));
            log.debug(&format!("downloading {} to {}", asset.name, part.display()));
            written.push(part.clone());
            Self::download(opts, asset, &part)?;
            std::fs::rename(&part, &dest).with_context(|| {
                format!("renaming {} to {}", part.display(), dest.display())
            })?;
            written.pop();
            written.push(dest);
            log.info(&format!("installed {}", asset.name));
        }
        Ok(())
    }
}

impl UpdateSource for GithubSource {
    fn configure(&mut self, options: &toml::Table) -> Result<()> {
        let opts: GithubOptions = parse_options(SOURCE_NAME, options)?;
        if !is_repository_slug(&opts.repository) {
            return Err(SourceError::InvalidConfiguration {
                source_name: SOURCE_NAME.to_string(),
                reason: format!(
                    "repository must be 'owner/name', got '{}'",
                    opts.repository
                ),
            }
            .into());
        }
        self.options = Some(opts);
        Ok(())
    }

    fn check_for_update(&mut self, current: Option<&VersionFingerprint>) -> Result<bool> {
        let release = self.fetch_latest()?;
        let remote = VersionFingerprint::from_tag(&release.tag_name);
        self.latest = Some(release);
        Ok(crate::fingerprint::is_stale(current, &remote))
    }

    fn perform_update(
        &mut self,
        log: &dyn Log,
        target_dir: &Path,
    ) -> Result<Option<VersionFingerprint>> {
        let release = match self.latest.take() {
            Some(release) => release,
            None => self.fetch_latest()?,
        };
        let opts = self.options()?;

        let assets = match select_assets(&release, opts.assets.as_deref()) {
            Ok(assets) => assets,
            Err(reason) => {
                log.error(&format!("release {}: {reason}", release.tag_name));
                return Ok(None);
            }
        };

        log.info(&format!(
            "installing release {} ({} asset(s))",
            release.tag_name,
            assets.len()
        ));

        let mut written = Vec::new();
        if let Err(e) = Self::install_assets(opts, &assets, target_dir, &mut written, log) {
            log.error(&format!("release {}: {e:#}", release.tag_name));
            for path in &written {
                if let Err(remove_err) = std::fs::remove_file(path)
                    && remove_err.kind() != std::io::ErrorKind::NotFound
                {
                    log.warn(&format!(
                        "could not remove {}: {remove_err}",
                        path.display()
                    ));
                }
            }
            return Ok(None);
        }

        Ok(Some(VersionFingerprint::from_tag(&release.tag_name)))
    }
}

fn releases_url(opts: &GithubOptions) -> String {
    format!(
        "{}/repos/{}/releases?per_page={RELEASES_PER_PAGE}",
        opts.api_url.trim_end_matches('/'),
        opts.repository
    )
}

fn is_repository_slug(repository: &str) -> bool {
    let mut parts = repository.split('/');
    matches!(
        (parts.next(), parts.next(), parts.next()),
        (Some(owner), Some(name), None) if !owner.is_empty() && !name.is_empty()
    )
}

fn parse_releases(origin: &str, body: &str) -> Result<Vec<Release>, SourceError> {
    serde_json::from_str(body).map_err(|e| SourceError::InvalidResponse {
        origin: origin.to_string(),
        reason: e.to_string(),
    })
}

/// Newest non-draft release, skipping prereleases unless allowed.
///
/// The API lists releases newest first.
fn select_release(releases: Vec<Release>, include_prereleases: bool) -> Option<Release> {
    releases
        .into_iter()
        .find(|r| !r.draft && (include_prereleases || !r.prerelease))
}

/// Pick the assets to install, rejecting names that would land outside the
/// target directory.
fn select_assets<'a>(
    release: &'a Release,
    wanted: Option<&[String]>,
) -> Result<Vec<&'a Asset>, String> {
    let selected: Vec<&Asset> = match wanted {
        None => release.assets.iter().collect(),
        Some(names) => {
            let mut selected = Vec::with_capacity(names.len());
            for name in names {
                let asset = release
                    .assets
                    .iter()
                    .find(|a| &a.name == name)
                    .ok_or_else(|| format!("asset '{name}' not found"))?;
                selected.push(asset);
            }
            selected
        }
    };

    if selected.is_empty() {
        return Err("release has no assets to install".to_string());
    }
    if let Some(bad) = selected.iter().find(|a| !is_plain_file_name(&a.name)) {
        return Err(format!("refusing asset with unsafe name '{}'", bad.name));
    }
    Ok(selected)
}

fn is_plain_file_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\'])
        && !crate::fingerprint::is_marker_name(name)
}
