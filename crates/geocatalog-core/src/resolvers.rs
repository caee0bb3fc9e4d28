//! Resolver registry for imagery item metadata.
//!
//! A resolver turns the URI of an image in object storage into a
//! [`MetadataRecord`]. Which resolver applies is decided purely from the
//! image file name: each sensor family has its own naming tokens (`SPOT6`,
//! `PHR1A`, ...). Resolvers read a sidecar STAC item document stored next to
//! the image and fill properties the document leaves out from the naming
//! convention.
//!
//! # Examples
//!
//! ```
//! use geocatalog_core::resolvers::{ResolverKind, classify, find_resolver};
//!
//! assert_eq!(
//!     classify("gs://bucket/IMG_SPOT6_MS_201905011030123_ORT.tif"),
//!     Some(ResolverKind::Spot)
//! );
//! assert_eq!(classify("gs://bucket/b.tif"), None);
//!
//! let pleiades = find_resolver("pleiades").expect("Pleiades resolver should exist");
//! assert_eq!(pleiades.kind, ResolverKind::Pleiades);
//! ```

use std::collections::HashMap;
use std::fmt;
use std::path::Path;

use chrono::{DateTime, Utc};
use geo_types::{Rect, coord};
use log::debug;
use serde::Deserialize;

use crate::error::ResolveError;
use crate::storage::{StorageClient, split_uri};
use crate::types::MetadataRecord;

/// The fixed set of resolver strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResolverKind {
    /// Airbus SPOT 6/7 products.
    Spot,
    /// Airbus Pléiades 1A/1B products.
    Pleiades,
}

impl ResolverKind {
    /// Registry entry for this kind.
    #[must_use]
    pub fn resolver(self) -> &'static Resolver {
        match self {
            ResolverKind::Spot => &SPOT,
            ResolverKind::Pleiades => &PLEIADES,
        }
    }
}

impl fmt::Display for ResolverKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.resolver().short_name)
    }
}

/// Registry entry describing one resolver strategy.
#[derive(Debug, Clone)]
pub struct Resolver {
    /// The strategy this entry describes.
    pub kind: ResolverKind,
    /// Short name used in the CLI (e.g. `"SPOT"`).
    pub short_name: &'static str,
    /// Descriptive name for display.
    pub long_name: &'static str,
    /// File name tokens that select this resolver, with the platform name
    /// each one implies.
    pub sensors: &'static [(&'static str, &'static str)],
    /// Product mode tokens with their nominal ground sample distance.
    pub modes: &'static [(&'static str, f64)],
    /// Appended to the image stem to name the sidecar document.
    pub sidecar_suffix: &'static str,
}

impl Resolver {
    /// Sensor tokens as a comma-separated list.
    #[must_use]
    pub fn sensor_tokens(&self) -> String {
        self.sensors
            .iter()
            .map(|(token, _)| *token)
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Sidecar document URI for an image URI.
    #[must_use]
    pub fn sidecar_uri(&self, uri: &str) -> String {
        let (dir, name) = split_uri(uri);
        let stem = name.rsplit_once('.').map_or(name, |(stem, _)| stem);
        if dir.is_empty() {
            format!("{stem}{}", self.sidecar_suffix)
        } else {
            format!("{dir}/{stem}{}", self.sidecar_suffix)
        }
    }

    fn matches(&self, tokens: &[String]) -> Option<&'static str> {
        self.sensors
            .iter()
            .find(|(token, _)| tokens.iter().any(|t| t == token))
            .map(|(_, platform)| *platform)
    }

    fn nominal_gsd(&self, tokens: &[String]) -> Option<f64> {
        self.modes
            .iter()
            .find(|(mode, _)| tokens.iter().any(|t| t == mode))
            .map(|(_, gsd)| *gsd)
    }
}

static SPOT: Resolver = Resolver {
    kind: ResolverKind::Spot,
    short_name: "SPOT",
    long_name: "Airbus SPOT 6/7 ortho products",
    sensors: &[("SPOT6", "spot-6"), ("SPOT7", "spot-7")],
    modes: &[("PMS", 1.5), ("MS", 6.0), ("P", 1.5)],
    sidecar_suffix: ".json",
};

static PLEIADES: Resolver = Resolver {
    kind: ResolverKind::Pleiades,
    short_name: "Pleiades",
    long_name: "Airbus Pléiades 1A/1B ortho products",
    sensors: &[("PHR1A", "pleiades-1a"), ("PHR1B", "pleiades-1b")],
    modes: &[("PMS", 0.5), ("MS", 2.0), ("P", 0.5)],
    sidecar_suffix: "_item.json",
};

/// Returns every registered resolver.
#[must_use]
pub fn get_resolvers() -> Vec<&'static Resolver> {
    vec![&SPOT, &PLEIADES]
}

/// Finds a resolver by short name (case-insensitive).
#[must_use]
pub fn find_resolver(name: &str) -> Option<&'static Resolver> {
    get_resolvers()
        .into_iter()
        .find(|r| r.short_name.eq_ignore_ascii_case(name))
}

/// Upper-cased name tokens of the file part of `uri`.
fn name_tokens(uri: &str) -> Vec<String> {
    let (_, name) = split_uri(uri);
    name.split(['_', '.', '-'])
        .filter(|t| !t.is_empty())
        .map(str::to_ascii_uppercase)
        .collect()
}

/// Picks the resolver for an image URI from its file name.
///
/// Returns `None` when no resolver recognizes the name.
#[must_use]
pub fn classify(uri: &str) -> Option<ResolverKind> {
    let tokens = name_tokens(uri);
    get_resolvers()
        .into_iter()
        .find(|r| r.matches(&tokens).is_some())
        .map(|r| r.kind)
}

/// What a resolver may consult besides the image URI itself.
#[derive(Clone, Copy)]
pub struct ResolveContext<'a> {
    /// Storage holding the image and its sidecar.
    pub storage: &'a dyn StorageClient,
    /// Directory searched first for a sidecar file of the same name. Used
    /// to override or supply sidecars without touching the bucket.
    pub local_dir: Option<&'a Path>,
}

impl<'a> ResolveContext<'a> {
    /// Creates a context that reads sidecars from `storage` only.
    #[must_use]
    pub fn new(storage: &'a dyn StorageClient) -> Self {
        Self {
            storage,
            local_dir: None,
        }
    }

    /// Sets the local sidecar override directory.
    #[must_use]
    pub fn with_local_dir(mut self, local_dir: Option<&'a Path>) -> Self {
        self.local_dir = local_dir;
        self
    }

    fn read_sidecar(&self, sidecar: &str) -> Result<Vec<u8>, ResolveError> {
        if let Some(dir) = self.local_dir {
            let local = dir.join(split_uri(sidecar).1);
            if local.is_file() {
                debug!("Using local sidecar {}", local.display());
                return std::fs::read(&local).map_err(|err| ResolveError::Sidecar {
                    sidecar: local.display().to_string(),
                    source: Box::new(err),
                });
            }
        }

        self.storage
            .fetch(sidecar)
            .map(|bytes| bytes.to_vec())
            .map_err(|err| ResolveError::Sidecar {
                sidecar: sidecar.to_string(),
                source: Box::new(err),
            })
    }
}

/// Resolves an image URI into a metadata record using the given strategy.
///
/// # Errors
///
/// Returns a [`ResolveError`] if the sidecar cannot be read or parsed, or a
/// required property is neither in the sidecar nor derivable from the name.
pub fn resolve(
    kind: ResolverKind,
    context: &ResolveContext<'_>,
    uri: &str,
) -> Result<MetadataRecord, ResolveError> {
    let resolver = kind.resolver();
    let sidecar = resolver.sidecar_uri(uri);
    debug!("Resolving {uri} with {kind} resolver (sidecar {sidecar})");

    let bytes = context.read_sidecar(&sidecar)?;
    let item: StacItem = serde_json::from_slice(&bytes).map_err(|err| ResolveError::Parse {
        sidecar: sidecar.clone(),
        message: err.to_string(),
    })?;

    item.into_record(resolver, uri, &sidecar)
}

/// The subset of a STAC item document the catalog needs.
#[derive(Debug, Deserialize)]
struct StacItem {
    id: Option<String>,
    bbox: Option<Vec<f64>>,
    #[serde(default)]
    properties: StacProperties,
    #[serde(default)]
    assets: HashMap<String, StacAsset>,
}

#[derive(Debug, Default, Deserialize)]
struct StacProperties {
    datetime: Option<DateTime<Utc>>,
    platform: Option<String>,
    gsd: Option<f64>,
    #[serde(rename = "proj:epsg")]
    epsg: Option<i32>,
}

#[derive(Debug, Deserialize)]
struct StacAsset {
    href: String,
}

impl StacItem {
    fn into_record(
        self,
        resolver: &Resolver,
        uri: &str,
        sidecar: &str,
    ) -> Result<MetadataRecord, ResolveError> {
        let missing = |property: &str| ResolveError::MissingProperty {
            uri: uri.to_string(),
            property: property.to_string(),
        };
        let tokens = name_tokens(uri);
        let (dir, name) = split_uri(uri);

        // A blank value is an item error; an absent one may be derived.
        let id = match self.id {
            Some(id) if id.trim().is_empty() => return Err(missing("id")),
            Some(id) => id,
            None => name.rsplit_once('.').map_or(name, |(stem, _)| stem).to_string(),
        };

        let platform = match self.properties.platform {
            Some(platform) if platform.trim().is_empty() => return Err(missing("platform")),
            Some(platform) => platform,
            None => resolver
                .matches(&tokens)
                .map(str::to_string)
                .ok_or_else(|| missing("platform"))?,
        };

        let gsd = self
            .properties
            .gsd
            .or_else(|| resolver.nominal_gsd(&tokens))
            .ok_or_else(|| missing("gsd"))?;

        let projection = self.properties.epsg.ok_or_else(|| missing("proj:epsg"))?;
        let datetime = self.properties.datetime.ok_or_else(|| missing("datetime"))?;

        let bbox = match self.bbox.as_deref() {
            Some(&[min_x, min_y, max_x, max_y]) => {
                Rect::new(coord! { x: min_x, y: min_y }, coord! { x: max_x, y: max_y })
            },
            Some(other) => {
                return Err(ResolveError::Parse {
                    sidecar: sidecar.to_string(),
                    message: format!("bbox must have 4 values, found {}", other.len()),
                });
            },
            None => return Err(missing("bbox")),
        };

        let link = match self.assets.get("image") {
            Some(asset) if asset.href.trim().is_empty() => return Err(missing("assets.image.href")),
            Some(asset) if asset.href.contains("://") => asset.href.clone(),
            Some(asset) => format!("{dir}/{}", asset.href.trim_start_matches("./")),
            None => uri.to_string(),
        };

        Ok(MetadataRecord {
            id,
            platform,
            gsd,
            projection,
            datetime,
            bbox,
            link,
        })
    }
}
