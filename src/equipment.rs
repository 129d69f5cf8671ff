//! The equipment catalog: gear, fragments and the recipes that turn one into the other.
//!
//! Equipment is authored as a flat list of [`RawEquipment`] entries (RON by default),
//! validated and converted into an [`EquipmentManifest`], and then costed with the
//! [`bom`](crate::bom) resolver.
//!
//! ```
//! use bevy::ecs::world::World;
//! use equipment_manifest::equipment::{EquipmentManifest, RawEquipmentManifest};
//! use equipment_manifest::manifest::Manifest;
//!
//! let raw: RawEquipmentManifest = ron::de::from_str(
//!     r#"(items: [
//!         (id: "iron", name: "Iron"),
//!         (id: "leather", name: "Leather"),
//!         (id: "hilt", name: "Hilt", crafting_recipe: Some((gold_cost: 50, components: [
//!             (item: "iron", quantity: 2),
//!         ]))),
//!         (id: "sword", name: "Sword", crafting_recipe: Some((gold_cost: 100, components: [
//!             (item: "hilt", quantity: 1),
//!             (item: "leather", quantity: 3),
//!         ]))),
//!     ])"#,
//! )
//! .unwrap();
//!
//! let manifest = EquipmentManifest::from_raw_manifest(raw, &mut World::new()).unwrap();
//! let bom = manifest.raw_requirements("sword").unwrap().unwrap();
//! assert_eq!(bom.gold_cost, 150);
//! ```

use std::cmp::Ordering;

use bevy::asset::Asset;
use bevy::ecs::world::World;
use bevy::log::{info, warn};
use bevy::prelude::Resource;
use bevy::reflect::TypePath;
use bevy::utils::{HashMap, HashSet};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::bom::{self, BomError, Craftable, CraftingRecipe, RawRequirements, Requirement};
use crate::identifier::Id;
use crate::manifest::{
    Manifest, ManifestFormat, ManifestModificationError, MutableManifest, NamedManifest,
    NamedMutableManifest,
};

/// The color tier of a piece of equipment.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub enum Quality {
    /// The lowest tier.
    #[default]
    Gray,
    /// Second tier.
    Green,
    /// Third tier.
    Blue,
    /// Fourth tier.
    Violet,
    /// Fifth tier.
    Orange,
    /// The highest tier.
    Red,
}

/// A piece of equipment, a fragment, or any other catalog entry that recipes can reference.
#[derive(Debug, Clone, PartialEq)]
pub struct Equipment {
    /// Hash of [`Equipment::slug`].
    pub id: Id<Equipment>,
    /// The stable string id, as written in the data files.
    pub slug: String,
    /// Display name.
    pub name: String,
    /// Color tier.
    pub quality: Quality,
    /// The hero level needed to wear it.
    pub hero_level: u16,
    /// Gold received when selling one unit.
    pub sell_price: u64,
    /// How to craft one unit, if it can be crafted at all.
    pub crafting_recipe: Option<CraftingRecipe<Equipment>>,
}

impl Craftable for Equipment {
    fn id(&self) -> Id<Self> {
        self.id
    }

    /// Equipment is reported by slug, which is what data authors search for.
    fn name(&self) -> &str {
        &self.slug
    }

    fn crafting_recipe(&self) -> Option<&CraftingRecipe<Self>> {
        self.crafting_recipe.as_ref()
    }

    /// Lowest quality first, then alphabetically by display name.
    fn bom_order(&self, other: &Self) -> Ordering {
        self.quality
            .cmp(&other.quality)
            .then_with(|| self.name.cmp(&other.name))
    }
}

/// The on-disk form of [`Equipment`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawEquipment {
    /// The stable string id, e.g. `"iron_ingot"`.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Defaults to [`Quality::Gray`].
    #[serde(default)]
    pub quality: Quality,
    /// The hero level needed to wear it. Defaults to 0.
    #[serde(default)]
    pub hero_level: u16,
    /// Gold received when selling one unit. Defaults to 0.
    #[serde(default)]
    pub sell_price: u64,
    /// Omit for base resources.
    #[serde(default)]
    pub crafting_recipe: Option<RawCraftingRecipe>,
}

/// The on-disk form of a [`CraftingRecipe`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawCraftingRecipe {
    /// Gold paid per craft. Defaults to 0.
    #[serde(default)]
    pub gold_cost: u64,
    /// Components are listed rather than keyed, so their authoring order survives loading.
    #[serde(default)]
    pub components: Vec<RawComponent>,
}

/// One ingredient line of a [`RawCraftingRecipe`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawComponent {
    /// The string id of the component.
    pub item: String,
    /// Units consumed per craft. Must be positive.
    pub quantity: u32,
}

/// The on-disk form of an [`EquipmentManifest`].
#[derive(Debug, Clone, PartialEq, Default, Asset, TypePath, Serialize, Deserialize)]
pub struct RawEquipmentManifest {
    /// Every entry of the catalog, in any order.
    pub items: Vec<RawEquipment>,
}

/// Why a raw equipment entry or catalog was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EquipmentConversionError {
    /// An entry has an empty string id.
    #[error("an equipment entry named {0:?} has an empty id")]
    EmptyId(String),
    /// Two entries share a string id.
    #[error("the id {0} is used by more than one entry")]
    DuplicateId(String),
    /// A recipe lists the same component twice.
    #[error("the recipe for {item} lists {component} more than once")]
    DuplicateComponent {
        /// The item being crafted.
        item: String,
        /// The repeated component.
        component: String,
    },
    /// A recipe asks for zero units of a component.
    #[error("the recipe for {item} asks for zero units of {component}")]
    ZeroQuantity {
        /// The item being crafted.
        item: String,
        /// The component with quantity zero.
        component: String,
    },
    /// A recipe lists its own item as a component.
    #[error("the recipe for {0} requires {0} itself")]
    SelfReference(String),
    /// Recipes across the catalog require each other in a loop.
    #[error("crafting recipes form a cycle: {}", .0.join(" -> "))]
    CyclicRecipes(Vec<String>),
}

impl TryFrom<RawEquipment> for Equipment {
    type Error = EquipmentConversionError;

    fn try_from(raw: RawEquipment) -> Result<Self, Self::Error> {
        if raw.id.is_empty() {
            return Err(EquipmentConversionError::EmptyId(raw.name));
        }

        let crafting_recipe = match raw.crafting_recipe {
            Some(raw_recipe) => Some(convert_recipe(&raw.id, raw_recipe)?),
            None => None,
        };

        Ok(Equipment {
            id: Id::from_name(&raw.id),
            slug: raw.id,
            name: raw.name,
            quality: raw.quality,
            hero_level: raw.hero_level,
            sell_price: raw.sell_price,
            crafting_recipe,
        })
    }
}

fn convert_recipe(
    slug: &str,
    raw: RawCraftingRecipe,
) -> Result<CraftingRecipe<Equipment>, EquipmentConversionError> {
    let mut seen = HashSet::default();
    let mut recipe = CraftingRecipe::new(raw.gold_cost);

    for component in raw.components {
        if component.item == slug {
            return Err(EquipmentConversionError::SelfReference(slug.to_string()));
        }
        if component.quantity == 0 {
            return Err(EquipmentConversionError::ZeroQuantity {
                item: slug.to_string(),
                component: component.item,
            });
        }
        let id = Id::from_name(&component.item);
        if !seen.insert(id) {
            return Err(EquipmentConversionError::DuplicateComponent {
                item: slug.to_string(),
                component: component.item,
            });
        }
        recipe = recipe.with_component(id, component.quantity);
    }

    Ok(recipe)
}

/// The equipment catalog.
///
/// Every recipe in the catalog is free of duplicate components and zero quantities,
/// and the crafting graph is acyclic when the manifest is built
/// or extended with [`MutableManifest::insert`].
/// Recipes may still name components that are not in the catalog:
/// those are skipped when costing and listed by [`EquipmentManifest::dangling_references`].
#[derive(Debug, Clone, PartialEq, Default, Resource)]
pub struct EquipmentManifest {
    items: HashMap<Id<Equipment>, Equipment>,
}

impl Manifest for EquipmentManifest {
    type RawManifest = RawEquipmentManifest;
    type RawItem = RawEquipment;
    type Item = Equipment;
    type ConversionError = EquipmentConversionError;

    #[cfg(feature = "ron")]
    const FORMAT: ManifestFormat = ManifestFormat::Ron;
    #[cfg(not(feature = "ron"))]
    const FORMAT: ManifestFormat = ManifestFormat::Custom;

    fn from_raw_manifest(
        raw_manifest: Self::RawManifest,
        _world: &mut World,
    ) -> Result<Self, Self::ConversionError> {
        let mut items = HashMap::default();

        for raw_item in raw_manifest.items {
            let item = Equipment::try_from(raw_item)?;
            if items.contains_key(&item.id) {
                return Err(EquipmentConversionError::DuplicateId(item.slug));
            }
            items.insert(item.id, item);
        }

        let manifest = EquipmentManifest { items };
        if let Some(cycle) = manifest.find_cycle() {
            return Err(EquipmentConversionError::CyclicRecipes(cycle));
        }

        for (item, component) in manifest.dangling_references() {
            warn!(
                "The recipe for {} references {}, which is not in the catalog.",
                item.slug, component
            );
        }
        info!(
            "Loaded {} equipment entries, {} of them craftable.",
            manifest.len(),
            manifest.iter().filter(|item| item.is_craftable()).count()
        );

        Ok(manifest)
    }

    fn get(&self, id: Id<Equipment>) -> Option<&Equipment> {
        self.items.get(&id)
    }

    fn len(&self) -> usize {
        self.items.len()
    }
}

impl NamedManifest for EquipmentManifest {}

impl MutableManifest for EquipmentManifest {
    /// The entry is stored under the hash of its slug, whatever its `id` field says.
    ///
    /// Rejects entries with an empty slug, and entries whose recipe would close a crafting cycle.
    fn insert(
        &mut self,
        mut item: Equipment,
    ) -> Result<Id<Equipment>, ManifestModificationError<Self>> {
        if item.slug.is_empty() {
            return Err(ManifestModificationError::ConversionFailed(
                EquipmentConversionError::EmptyId(item.name),
            ));
        }

        let id = Id::from_name(&item.slug);
        item.id = id;
        if self.items.contains_key(&id) {
            return Err(ManifestModificationError::DuplicateName(item.slug));
        }

        self.items.insert(id, item);
        if let Some(cycle) = self.find_cycle() {
            self.items.remove(&id);
            return Err(ManifestModificationError::ConversionFailed(
                EquipmentConversionError::CyclicRecipes(cycle),
            ));
        }

        Ok(id)
    }

    fn remove(&mut self, id: Id<Equipment>) -> Result<Equipment, ManifestModificationError<Self>> {
        self.items
            .remove(&id)
            .ok_or(ManifestModificationError::NotFound(id))
    }

    /// Edits made through this reference are not re-validated;
    /// run [`EquipmentManifest::find_cycle`] afterwards if recipes were changed.
    fn get_mut(&mut self, id: Id<Equipment>) -> Option<&mut Equipment> {
        self.items.get_mut(&id)
    }
}

impl NamedMutableManifest for EquipmentManifest {}

impl EquipmentManifest {
    /// Iterates over all entries, in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = &Equipment> {
        self.items.values()
    }

    /// The components consumed directly by one craft of `slug`.
    ///
    /// # Errors
    ///
    /// [`BomError::UnknownItem`] if `slug` is not in the catalog.
    pub fn direct_requirements(
        &self,
        slug: &str,
    ) -> Result<Vec<Requirement<'_, Equipment>>, BomError> {
        bom::direct_requirements_by_name(self, slug)
    }

    /// The flattened gold and base-component cost of one craft of `slug`.
    ///
    /// Returns `Ok(None)` if the item cannot be crafted.
    ///
    /// # Errors
    ///
    /// [`BomError::UnknownItem`] if `slug` is not in the catalog,
    /// or any error of [`bom::raw_requirements`].
    pub fn raw_requirements(
        &self,
        slug: &str,
    ) -> Result<Option<RawRequirements<'_, Equipment>>, BomError> {
        bom::raw_requirements_by_name(self, slug)
    }

    /// The entries whose recipes consume `id` directly, lowest quality first.
    pub fn used_in(&self, id: Id<Equipment>) -> Vec<&Equipment> {
        let mut users: Vec<&Equipment> = self
            .items
            .values()
            .filter(|item| {
                item.crafting_recipe
                    .as_ref()
                    .is_some_and(|recipe| recipe.quantity_of(id) > 0)
            })
            .collect();
        users.sort_by(|a, b| a.bom_order(b));
        users
    }

    /// Recipe components that are not in the catalog, as `(item, missing component)` pairs,
    /// sorted by slug.
    pub fn dangling_references(&self) -> Vec<(&Equipment, Id<Equipment>)> {
        let mut dangling: Vec<(&Equipment, Id<Equipment>)> = self
            .items
            .values()
            .filter_map(|item| item.crafting_recipe.as_ref().map(|recipe| (item, recipe)))
            .flat_map(|(item, recipe)| {
                recipe
                    .components
                    .iter()
                    .filter(|component| !self.items.contains_key(&component.item))
                    .map(move |component| (item, component.item))
            })
            .collect();
        dangling.sort_by(|a, b| a.0.slug.cmp(&b.0.slug).then(a.1.cmp(&b.1)));
        dangling
    }

    /// Searches the crafting graph for a cycle.
    ///
    /// Returns the slugs along the first cycle found, ending with the slug it started from.
    /// Roots are visited in slug order, so the result is deterministic.
    pub fn find_cycle(&self) -> Option<Vec<String>> {
        let mut roots: Vec<&Equipment> = self.items.values().collect();
        roots.sort_by(|a, b| a.slug.cmp(&b.slug));

        let mut marks = HashMap::default();
        let mut path = Vec::new();
        roots
            .into_iter()
            .find_map(|root| self.visit(root, &mut marks, &mut path))
    }

    fn visit<'a>(
        &'a self,
        item: &'a Equipment,
        marks: &mut HashMap<Id<Equipment>, Visit>,
        path: &mut Vec<&'a Equipment>,
    ) -> Option<Vec<String>> {
        match marks.get(&item.id) {
            Some(Visit::Done) => return None,
            Some(Visit::Active) => {
                let start = path.iter().position(|visited| visited.id == item.id)?;
                let mut cycle: Vec<String> =
                    path[start..].iter().map(|visited| visited.slug.clone()).collect();
                cycle.push(item.slug.clone());
                return Some(cycle);
            }
            None => {}
        }

        marks.insert(item.id, Visit::Active);
        path.push(item);

        if let Some(recipe) = &item.crafting_recipe {
            for component in &recipe.components {
                let Some(next) = self.items.get(&component.item) else {
                    continue;
                };
                if let Some(cycle) = self.visit(next, marks, path) {
                    return Some(cycle);
                }
            }
        }

        path.pop();
        marks.insert(item.id, Visit::Done);
        None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Visit {
    Active,
    Done,
}
