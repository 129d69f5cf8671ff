use std::error::Error;

use bevy::{
    asset::Asset,
    ecs::{system::Resource, world::World},
};
use serde::Deserialize;
use thiserror::Error;

use crate::identifier::Id;

/// A manifest is the canonical, validated catalog of one kind of game data,
/// loaded from disk and stored in the ECS as a resource.
///
/// Data files are authored in the serialization-friendly [`Manifest::RawManifest`] form:
/// string ids, flat lists, nothing precomputed.
/// Once loaded, the raw manifest is checked and converted into the final manifest,
/// where entries are looked up by [`Id`].
///
/// [`Manifest::get`] is the lookup that the [`bom`](crate::bom) resolver consumes:
/// every manifest whose items are [`Craftable`](crate::bom::Craftable) can be handed
/// to the resolver directly.
///
/// Entries should be treated as immutable once the manifest is built.
/// Editing tools use the [`MutableManifest`] extension instead.
pub trait Manifest: Sized + Resource {
    /// The on-disk form of the whole manifest.
    ///
    /// This may be `Self` if no processing is needed.
    type RawManifest: Asset + for<'de> Deserialize<'de>;

    /// The on-disk form of a single entry.
    type RawItem;

    /// The processed entry stored in the manifest.
    type Item: TryFrom<Self::RawItem, Error = Self::ConversionError>;

    /// Why a raw manifest (or a raw entry) was rejected.
    ///
    /// Use [`Infallible`](std::convert::Infallible) for manifests without a conversion step.
    type ConversionError: Error;

    /// The file format of the raw manifest, used to pick a [`bevy_common_assets`] loader.
    ///
    /// Set this to [`ManifestFormat::Custom`] and register your own
    /// [`bevy::asset::AssetLoader`] for anything else.
    const FORMAT: ManifestFormat;

    /// Validates and converts a raw manifest.
    ///
    /// Other manifests and resources can be read from the [`World`]
    /// when entries need to reference them.
    /// This is called by [`process_manifest::<M>`](crate::plugin::process_manifest)
    /// in the [`PreUpdate`](bevy::prelude::PreUpdate) schedule.
    fn from_raw_manifest(
        raw_manifest: Self::RawManifest,
        world: &mut World,
    ) -> Result<Self, Self::ConversionError>;

    /// Looks up an entry by its [`Id`].
    ///
    /// Returns [`None`] if the manifest has no such entry.
    fn get(&self, id: Id<Self::Item>) -> Option<&Self::Item>;

    /// The number of entries in the manifest.
    fn len(&self) -> usize;

    /// Returns true if the manifest has no entries.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// The file format of the raw manifest on disk.
///
/// Each variant other than [`ManifestFormat::Custom`] is gated behind
/// the Cargo feature of the same name.
pub enum ManifestFormat {
    #[cfg(feature = "ron")]
    /// Rusty Object Notation, the default for equipment catalogs.
    Ron,
    #[cfg(feature = "json")]
    /// JSON, as exported by most web tooling.
    Json,
    #[cfg(feature = "yaml")]
    /// YAML.
    Yaml,
    #[cfg(feature = "toml")]
    /// TOML.
    Toml,
    #[cfg(feature = "xml")]
    /// XML.
    Xml,
    #[cfg(feature = "csv")]
    /// Comma-separated values, for flat catalogs only.
    Csv,
    #[cfg(feature = "msgpack")]
    /// MessagePack, a compact binary encoding of JSON.
    MsgPack,
    /// Your own format.
    ///
    /// Register an [`bevy::asset::AssetLoader`] for [`Manifest::RawManifest`] yourself.
    Custom,
}

/// A manifest whose entries can be looked up by their stable string id.
///
/// String lookups hash the name with [`Id::from_name`] first,
/// so they cost one hash more than [`Manifest::get`].
pub trait NamedManifest: Manifest {
    /// Returns the [`Id`] of the entry with the given string id, if it exists.
    fn id_of(&self, name: &str) -> Option<Id<Self::Item>> {
        let id = Id::from_name(name);
        self.get(id).map(|_| id)
    }

    /// Looks up an entry by its string id.
    fn get_by_name(&self, name: &str) -> Option<&Self::Item> {
        self.id_of(name).and_then(|id| self.get(id))
    }
}

/// A manifest that can be edited at runtime.
///
/// Catalog editors and admin tooling need this; game code usually does not.
/// Editing can invalidate cross-references between entries
/// (a recipe may still name a component that was just removed),
/// so implementors should document what they re-check on every edit.
pub trait MutableManifest: Manifest {
    /// Inserts a new entry and returns its [`Id`].
    ///
    /// Implementors should derive the [`Id`] from the entry's string id with [`Id::from_name`],
    /// and return [`ManifestModificationError::DuplicateName`] if it is already taken.
    fn insert(
        &mut self,
        item: Self::Item,
    ) -> Result<Id<Self::Item>, ManifestModificationError<Self>>;

    /// Converts a raw entry and inserts it.
    fn insert_raw_item(
        &mut self,
        raw_item: Self::RawItem,
    ) -> Result<Id<Self::Item>, ManifestModificationError<Self>> {
        let item: Self::Item =
            TryFrom::try_from(raw_item).map_err(ManifestModificationError::ConversionFailed)?;
        self.insert(item)
    }

    /// Removes an entry, returning the removed entry.
    fn remove(
        &mut self,
        id: Id<Self::Item>,
    ) -> Result<Self::Item, ManifestModificationError<Self>>;

    /// Looks up an entry mutably by its [`Id`].
    fn get_mut(&mut self, id: Id<Self::Item>) -> Option<&mut Self::Item>;
}

/// Name-based editing, for manifests that are both [`NamedManifest`] and [`MutableManifest`].
pub trait NamedMutableManifest: NamedManifest + MutableManifest {
    /// Looks up an entry mutably by its string id.
    fn get_mut_by_name(&mut self, name: &str) -> Option<&mut Self::Item> {
        self.id_of(name).and_then(move |id| self.get_mut(id))
    }

    /// Inserts an entry after checking that `name` is not already taken.
    fn insert_by_name(
        &mut self,
        name: &str,
        item: Self::Item,
    ) -> Result<Id<Self::Item>, ManifestModificationError<Self>> {
        if self.id_of(name).is_some() {
            return Err(ManifestModificationError::DuplicateName(name.to_string()));
        }
        self.insert(item)
    }

    /// Converts a raw entry and inserts it after checking that `name` is not already taken.
    fn insert_raw_item_by_name(
        &mut self,
        name: &str,
        raw_item: Self::RawItem,
    ) -> Result<Id<Self::Item>, ManifestModificationError<Self>> {
        let item: Self::Item =
            TryFrom::try_from(raw_item).map_err(ManifestModificationError::ConversionFailed)?;
        self.insert_by_name(name, item)
    }

    /// Removes an entry by its string id.
    fn remove_by_name(
        &mut self,
        name: &str,
    ) -> Result<Self::Item, ManifestModificationError<Self>> {
        let id = self
            .id_of(name)
            .ok_or_else(|| ManifestModificationError::NameNotFound(name.to_string()))?;
        self.remove(id)
    }
}

/// An error that can occur when editing a manifest.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ManifestModificationError<M: Manifest> {
    /// The string id is already in use.
    #[error("the name {0} is already in use")]
    DuplicateName(String),
    /// The entry was rejected by the manifest's validation.
    #[error("the item could not be converted: {0}")]
    ConversionFailed(M::ConversionError),
    /// No entry has the given [`Id`].
    #[error("no item with ID {0} was found")]
    NotFound(Id<M::Item>),
    /// No entry has the given string id.
    #[error("no item with the name {0} was found")]
    NameNotFound(String),
}
