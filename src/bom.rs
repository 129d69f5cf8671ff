//! Bill-of-materials resolution over a crafting catalog.
//!
//! Items may be crafted from other items, which may themselves be crafted.
//! [`direct_requirements`] lists what one recipe consumes;
//! [`raw_requirements`] walks the whole crafting tree and reports the total gold
//! and the total quantity of every terminal (non-craftable) component.
//!
//! The resolver never owns the catalog: it reads it through an [`ItemLookup`],
//! which every [`Manifest`] implements.
//!
//! ```
//! use bevy::utils::HashMap;
//! use equipment_manifest::bom::{raw_requirements, Craftable, CraftingRecipe};
//! use equipment_manifest::identifier::Id;
//!
//! struct Part {
//!     slug: &'static str,
//!     recipe: Option<CraftingRecipe<Part>>,
//! }
//!
//! impl Craftable for Part {
//!     fn id(&self) -> Id<Self> {
//!         Id::from_name(self.slug)
//!     }
//!     fn name(&self) -> &str {
//!         self.slug
//!     }
//!     fn crafting_recipe(&self) -> Option<&CraftingRecipe<Self>> {
//!         self.recipe.as_ref()
//!     }
//! }
//!
//! let mut catalog: HashMap<Id<Part>, Part> = HashMap::default();
//! for part in [
//!     Part { slug: "iron", recipe: None },
//!     Part {
//!         slug: "hilt",
//!         recipe: Some(CraftingRecipe::new(50).with_component(Id::from_name("iron"), 2)),
//!     },
//!     Part {
//!         slug: "sword",
//!         recipe: Some(CraftingRecipe::new(100).with_component(Id::from_name("hilt"), 3)),
//!     },
//! ] {
//!     catalog.insert(part.id(), part);
//! }
//!
//! let sword = &catalog[&Id::<Part>::from_name("sword")];
//! let bom = raw_requirements(&catalog, sword).unwrap().unwrap();
//! assert_eq!(bom.gold_cost, 100 + 50 * 3);
//! assert_eq!(bom.quantity_of(Id::from_name("iron")), 6);
//! ```

use std::cmp::Ordering;

use bevy::log::{debug, warn};
use bevy::utils::HashMap;
use thiserror::Error;

use crate::identifier::Id;
use crate::manifest::Manifest;

/// An entry of a crafting catalog.
pub trait Craftable: Sized {
    /// The id under which this item is stored in its catalog.
    fn id(&self) -> Id<Self>;

    /// A human-readable name, used in error messages and logs.
    fn name(&self) -> &str;

    /// The recipe for one unit of this item.
    ///
    /// Items without a recipe are terminal: they are base resources.
    fn crafting_recipe(&self) -> Option<&CraftingRecipe<Self>>;

    /// The order in which [`raw_requirements`] lists its results.
    ///
    /// The sort is stable, so the default keeps components in the order they were first reached.
    fn bom_order(&self, _other: &Self) -> Ordering {
        Ordering::Equal
    }

    /// Returns true if this item has a recipe.
    fn is_craftable(&self) -> bool {
        self.crafting_recipe().is_some()
    }
}

/// The gold and components needed to craft one unit of an item.
///
/// Component ids are unique within a recipe and quantities are positive.
/// Catalogs check this when they are built; see [`crate::equipment`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CraftingRecipe<T> {
    /// Gold paid to craft one unit, on top of the components.
    pub gold_cost: u64,
    /// The direct ingredients, in authoring order.
    pub components: Vec<RecipeComponent<T>>,
}

impl<T> CraftingRecipe<T> {
    /// A recipe with no components yet.
    pub fn new(gold_cost: u64) -> Self {
        Self {
            gold_cost,
            components: Vec::new(),
        }
    }

    /// Adds a component to the recipe.
    #[must_use]
    pub fn with_component(mut self, item: Id<T>, quantity: u32) -> Self {
        self.components.push(RecipeComponent { item, quantity });
        self
    }

    /// The quantity of `item` consumed directly by this recipe, or 0.
    pub fn quantity_of(&self, item: Id<T>) -> u32 {
        self.components
            .iter()
            .find(|component| component.item == item)
            .map_or(0, |component| component.quantity)
    }
}

/// One ingredient line of a [`CraftingRecipe`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecipeComponent<T> {
    /// The component's id in the catalog.
    pub item: Id<T>,
    /// How many units one craft consumes.
    pub quantity: u32,
}

/// Read access to a catalog of `T`, by [`Id`].
///
/// A miss is not an error: the resolver skips components it cannot find.
pub trait ItemLookup<T> {
    /// Returns the item stored under `id`, if any.
    fn lookup(&self, id: Id<T>) -> Option<&T>;
}

impl<M: Manifest> ItemLookup<M::Item> for M {
    fn lookup(&self, id: Id<M::Item>) -> Option<&M::Item> {
        self.get(id)
    }
}

impl<T> ItemLookup<T> for HashMap<Id<T>, T> {
    fn lookup(&self, id: Id<T>) -> Option<&T> {
        self.get(&id)
    }
}

/// An item together with a quantity of it.
#[derive(Debug, PartialEq)]
pub struct Requirement<'a, T> {
    /// The id the item was looked up by.
    pub id: Id<T>,
    /// The item itself.
    pub item: &'a T,
    /// How many units are needed.
    pub quantity: u64,
}

impl<T> Clone for Requirement<'_, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Requirement<'_, T> {}

/// The flattened cost of crafting one unit of an item.
#[derive(Debug, Clone, PartialEq)]
pub struct RawRequirements<'a, T> {
    /// Gold summed over every tier of the crafting tree.
    pub gold_cost: u64,
    /// One entry per distinct terminal component, with quantities multiplied through every tier.
    pub required_items: Vec<Requirement<'a, T>>,
    /// Component ids that were referenced somewhere in the tree but not found in the catalog.
    ///
    /// Their cost is missing from the totals.
    pub missing: Vec<Id<T>>,
}

impl<'a, T> RawRequirements<'a, T> {
    /// The total quantity of a terminal component, or 0.
    pub fn quantity_of(&self, id: Id<T>) -> u64 {
        self.required_items
            .iter()
            .find(|requirement| requirement.id == id)
            .map_or(0, |requirement| requirement.quantity)
    }

    /// Returns true if crafting costs neither gold nor components.
    pub fn is_free(&self) -> bool {
        self.gold_cost == 0 && self.required_items.is_empty()
    }

    /// Returns true if every referenced component was found.
    pub fn is_complete(&self) -> bool {
        self.missing.is_empty()
    }
}

/// Errors raised while resolving a bill of materials.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BomError {
    /// An item requires itself, directly or through other recipes.
    ///
    /// `path` lists item names from the first repeated item back to itself.
    #[error("cyclic crafting dependency detected: {}", path.join(" -> "))]
    CyclicDependency {
        /// The items along the cycle.
        path: Vec<String>,
    },
    /// A gold or quantity total does not fit in a `u64`.
    #[error("crafting cost of {item} overflows")]
    Overflow {
        /// The item whose totals overflowed.
        item: String,
    },
    /// The item to resolve is not in the catalog.
    #[error("no item named {0} in the catalog")]
    UnknownItem(String),
}

/// Lists the components consumed directly by one craft of `item`.
///
/// Crafted components are not expanded. Components missing from the catalog are skipped.
/// Terminal items have no direct requirements.
pub fn direct_requirements<'a, T, L>(lookup: &'a L, item: &T) -> Vec<Requirement<'a, T>>
where
    T: Craftable,
    L: ItemLookup<T> + ?Sized,
{
    let Some(recipe) = item.crafting_recipe() else {
        return Vec::new();
    };

    recipe
        .components
        .iter()
        .filter_map(|component| match lookup.lookup(component.item) {
            Some(found) => Some(Requirement {
                id: component.item,
                item: found,
                quantity: u64::from(component.quantity),
            }),
            None => {
                debug!(
                    "Skipping component {} of {}: not in the catalog.",
                    component.item,
                    item.name()
                );
                None
            }
        })
        .collect()
}

/// Like [`direct_requirements`], starting from the item's string id.
///
/// # Errors
///
/// [`BomError::UnknownItem`] if `name` is not in the catalog.
pub fn direct_requirements_by_name<'a, T, L>(
    lookup: &'a L,
    name: &str,
) -> Result<Vec<Requirement<'a, T>>, BomError>
where
    T: Craftable,
    L: ItemLookup<T> + ?Sized,
{
    let item = lookup
        .lookup(Id::from_name(name))
        .ok_or_else(|| BomError::UnknownItem(name.to_string()))?;
    Ok(direct_requirements(lookup, item))
}

/// Flattens the crafting tree of `item` into total gold and terminal components,
/// sorted by [`Craftable::bom_order`].
///
/// Returns `Ok(None)` if `item` is not craftable, which is distinct from a craftable
/// item that happens to cost nothing.
///
/// # Errors
///
/// - [`BomError::CyclicDependency`] if an item transitively requires itself.
/// - [`BomError::Overflow`] if a total does not fit in a `u64`.
pub fn raw_requirements<'a, T, L>(
    lookup: &'a L,
    item: &'a T,
) -> Result<Option<RawRequirements<'a, T>>, BomError>
where
    T: Craftable,
    L: ItemLookup<T> + ?Sized,
{
    raw_requirements_by(lookup, item, T::bom_order)
}

/// Like [`raw_requirements`], with a caller-supplied ordering for the results.
///
/// # Errors
///
/// See [`raw_requirements`].
pub fn raw_requirements_by<'a, T, L, F>(
    lookup: &'a L,
    item: &'a T,
    mut compare: F,
) -> Result<Option<RawRequirements<'a, T>>, BomError>
where
    T: Craftable,
    L: ItemLookup<T> + ?Sized,
    F: FnMut(&T, &T) -> Ordering,
{
    let mut path = Vec::new();
    expand(lookup, item, &mut path, &mut compare)
}

/// Like [`raw_requirements`], starting from the item's string id.
///
/// # Errors
///
/// [`BomError::UnknownItem`] if `name` is not in the catalog, otherwise see [`raw_requirements`].
pub fn raw_requirements_by_name<'a, T, L>(
    lookup: &'a L,
    name: &str,
) -> Result<Option<RawRequirements<'a, T>>, BomError>
where
    T: Craftable,
    L: ItemLookup<T> + ?Sized,
{
    let item = lookup
        .lookup(Id::from_name(name))
        .ok_or_else(|| BomError::UnknownItem(name.to_string()))?;
    raw_requirements(lookup, item)
}

/// Depth-first expansion of one item. `path` holds the items currently being expanded.
fn expand<'a, T, L, F>(
    lookup: &'a L,
    item: &'a T,
    path: &mut Vec<&'a T>,
    compare: &mut F,
) -> Result<Option<RawRequirements<'a, T>>, BomError>
where
    T: Craftable,
    L: ItemLookup<T> + ?Sized,
    F: FnMut(&T, &T) -> Ordering,
{
    let Some(recipe) = item.crafting_recipe() else {
        return Ok(None);
    };

    let id = item.id();
    if let Some(start) = path.iter().position(|visited| visited.id() == id) {
        let mut cycle: Vec<String> = path[start..]
            .iter()
            .map(|visited| visited.name().to_string())
            .collect();
        cycle.push(item.name().to_string());
        return Err(BomError::CyclicDependency { path: cycle });
    }
    path.push(item);

    let mut totals = Totals::new(item, recipe.gold_cost);
    for component in &recipe.components {
        let Some(found) = lookup.lookup(component.item) else {
            warn!(
                "Component {} of {} is not in the catalog; its cost is left out.",
                component.item,
                item.name()
            );
            totals.note_missing(component.item);
            continue;
        };
        let quantity = u64::from(component.quantity);

        if found.is_craftable() {
            if let Some(nested) = expand(lookup, found, path, compare)? {
                let gold = nested
                    .gold_cost
                    .checked_mul(quantity)
                    .ok_or_else(|| totals.overflow())?;
                totals.add_gold(gold)?;
                for requirement in nested.required_items {
                    let scaled = requirement
                        .quantity
                        .checked_mul(quantity)
                        .ok_or_else(|| totals.overflow())?;
                    totals.add(requirement.id, requirement.item, scaled)?;
                }
                for missing in nested.missing {
                    totals.note_missing(missing);
                }
            }
        } else {
            totals.add(component.item, found, quantity)?;
        }
    }

    path.pop();
    Ok(Some(totals.finish(compare)))
}

/// Running totals for one level of the expansion.
struct Totals<'a, T> {
    item: &'a T,
    result: RawRequirements<'a, T>,
    positions: HashMap<Id<T>, usize>,
}

impl<'a, T: Craftable> Totals<'a, T> {
    fn new(item: &'a T, gold_cost: u64) -> Self {
        Self {
            item,
            result: RawRequirements {
                gold_cost,
                required_items: Vec::new(),
                missing: Vec::new(),
            },
            positions: HashMap::default(),
        }
    }

    fn overflow(&self) -> BomError {
        BomError::Overflow {
            item: self.item.name().to_string(),
        }
    }

    fn add_gold(&mut self, gold: u64) -> Result<(), BomError> {
        self.result.gold_cost = self
            .result
            .gold_cost
            .checked_add(gold)
            .ok_or_else(|| self.overflow())?;
        Ok(())
    }

    /// Adds `quantity` units of a terminal component,
    /// combining with an existing entry for the same id.
    fn add(&mut self, id: Id<T>, item: &'a T, quantity: u64) -> Result<(), BomError> {
        match self.positions.get(&id) {
            Some(&index) => {
                let total = self.result.required_items[index]
                    .quantity
                    .checked_add(quantity)
                    .ok_or_else(|| self.overflow())?;
                self.result.required_items[index].quantity = total;
            }
            None => {
                self.positions.insert(id, self.result.required_items.len());
                self.result
                    .required_items
                    .push(Requirement { id, item, quantity });
            }
        }
        Ok(())
    }

    fn note_missing(&mut self, id: Id<T>) {
        if !self.result.missing.contains(&id) {
            self.result.missing.push(id);
        }
    }

    fn finish<F>(mut self, compare: &mut F) -> RawRequirements<'a, T>
    where
        F: FnMut(&T, &T) -> Ordering,
    {
        self.result
            .required_items
            .sort_by(|a, b| compare(a.item, b.item));
        self.result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Part {
        slug: &'static str,
        tier: u8,
        recipe: Option<CraftingRecipe<Part>>,
    }

    impl Craftable for Part {
        fn id(&self) -> Id<Self> {
            Id::from_name(self.slug)
        }

        fn name(&self) -> &str {
            self.slug
        }

        fn crafting_recipe(&self) -> Option<&CraftingRecipe<Self>> {
            self.recipe.as_ref()
        }

        fn bom_order(&self, other: &Self) -> Ordering {
            self.tier
                .cmp(&other.tier)
                .then_with(|| self.slug.cmp(other.slug))
        }
    }

    fn terminal(slug: &'static str) -> Part {
        Part {
            slug,
            tier: 0,
            recipe: None,
        }
    }

    fn crafted(slug: &'static str, gold_cost: u64, components: &[(&str, u32)]) -> Part {
        let recipe = components
            .iter()
            .fold(CraftingRecipe::new(gold_cost), |recipe, &(name, quantity)| {
                recipe.with_component(Id::from_name(name), quantity)
            });
        Part {
            slug,
            tier: 1,
            recipe: Some(recipe),
        }
    }

    fn catalog(parts: Vec<Part>) -> HashMap<Id<Part>, Part> {
        parts.into_iter().map(|part| (part.id(), part)).collect()
    }

    fn get<'a>(catalog: &'a HashMap<Id<Part>, Part>, slug: &str) -> &'a Part {
        &catalog[&Id::<Part>::from_name(slug)]
    }

    fn quantities(bom: &RawRequirements<'_, Part>) -> Vec<(&'static str, u64)> {
        bom.required_items
            .iter()
            .map(|requirement| (requirement.item.slug, requirement.quantity))
            .collect()
    }

    /// Leather and iron are terminal; a hilt needs 2 iron; a sword needs a hilt and 3 leather.
    fn sword_catalog() -> HashMap<Id<Part>, Part> {
        catalog(vec![
            terminal("leather"),
            terminal("iron"),
            crafted("hilt", 50, &[("iron", 2)]),
            crafted("sword", 100, &[("hilt", 1), ("leather", 3)]),
        ])
    }

    #[test]
    fn terminal_items_have_nothing_to_flatten() {
        let catalog = sword_catalog();
        let leather = get(&catalog, "leather");

        assert_eq!(raw_requirements(&catalog, leather), Ok(None));
        assert!(direct_requirements(&catalog, leather).is_empty());
    }

    #[test]
    fn empty_recipe_costs_only_its_gold() {
        let catalog = catalog(vec![crafted("blessing", 75, &[])]);
        let bom = raw_requirements(&catalog, get(&catalog, "blessing"))
            .unwrap()
            .unwrap();

        assert_eq!(bom.gold_cost, 75);
        assert!(bom.required_items.is_empty());
        assert!(!bom.is_free());
    }

    #[test]
    fn zero_cost_recipe_is_not_the_same_as_not_craftable() {
        let catalog = catalog(vec![crafted("nothing", 0, &[])]);
        let bom = raw_requirements(&catalog, get(&catalog, "nothing")).unwrap();

        assert!(bom.is_some_and(|bom| bom.is_free()));
    }

    #[test]
    fn single_tier_keeps_quantities() {
        let catalog = catalog(vec![
            terminal("cloth"),
            terminal("thread"),
            crafted("cloak", 10, &[("cloth", 4), ("thread", 7)]),
        ]);
        let bom = raw_requirements(&catalog, get(&catalog, "cloak"))
            .unwrap()
            .unwrap();

        assert_eq!(quantities(&bom), vec![("cloth", 4), ("thread", 7)]);
        assert_eq!(bom.gold_cost, 10);
    }

    #[test]
    fn shared_components_are_combined() {
        let catalog = catalog(vec![
            terminal("x"),
            crafted("b", 5, &[("x", 3)]),
            crafted("a", 1, &[("x", 2), ("b", 1)]),
        ]);
        let bom = raw_requirements(&catalog, get(&catalog, "a"))
            .unwrap()
            .unwrap();

        assert_eq!(quantities(&bom), vec![("x", 5)]);
        assert_eq!(bom.gold_cost, 6);
    }

    #[test]
    fn quantities_multiply_through_tiers() {
        let catalog = catalog(vec![
            terminal("y"),
            crafted("b", 20, &[("y", 4)]),
            crafted("a", 7, &[("b", 3)]),
        ]);
        let bom = raw_requirements(&catalog, get(&catalog, "a"))
            .unwrap()
            .unwrap();

        assert_eq!(bom.quantity_of(Id::from_name("y")), 12);
        assert_eq!(bom.gold_cost, 7 + 20 * 3);
    }

    #[test]
    fn three_tiers_multiply_all_the_way_down() {
        let catalog = catalog(vec![
            terminal("ore"),
            crafted("ingot", 1, &[("ore", 5)]),
            crafted("plate", 2, &[("ingot", 3)]),
            crafted("armor", 4, &[("plate", 2), ("ore", 1)]),
        ]);
        let bom = raw_requirements(&catalog, get(&catalog, "armor"))
            .unwrap()
            .unwrap();

        assert_eq!(bom.quantity_of(Id::from_name("ore")), 2 * 3 * 5 + 1);
        assert_eq!(bom.gold_cost, 4 + 2 * (2 + 3 * 1));
    }

    #[test]
    fn missing_components_are_skipped_and_reported() {
        let catalog = catalog(vec![
            terminal("iron"),
            crafted("hilt", 50, &[("iron", 2), ("ghost", 1)]),
            crafted("sword", 100, &[("hilt", 2), ("phantom", 4)]),
        ]);
        let sword = get(&catalog, "sword");

        let bom = raw_requirements(&catalog, sword).unwrap().unwrap();
        assert_eq!(quantities(&bom), vec![("iron", 4)]);
        assert_eq!(bom.gold_cost, 200);
        assert_eq!(
            bom.missing,
            vec![Id::from_name("ghost"), Id::from_name("phantom")]
        );
        assert!(!bom.is_complete());

        let direct = direct_requirements(&catalog, sword);
        assert_eq!(direct.len(), 1);
        assert_eq!(direct[0].item.slug, "hilt");
    }

    #[test]
    fn resolution_is_repeatable() {
        let catalog = sword_catalog();
        let sword = get(&catalog, "sword");

        assert_eq!(
            raw_requirements(&catalog, sword),
            raw_requirements(&catalog, sword)
        );
    }

    #[test]
    fn sword_example() {
        let catalog = sword_catalog();
        let sword = get(&catalog, "sword");

        let bom = raw_requirements(&catalog, sword).unwrap().unwrap();
        assert_eq!(bom.gold_cost, 150);
        assert_eq!(quantities(&bom), vec![("iron", 2), ("leather", 3)]);
        assert!(bom.is_complete());

        let direct: Vec<_> = direct_requirements(&catalog, sword)
            .into_iter()
            .map(|requirement| (requirement.item.slug, requirement.quantity))
            .collect();
        assert_eq!(direct, vec![("hilt", 1), ("leather", 3)]);
    }

    #[test]
    fn custom_ordering_is_applied() {
        let catalog = sword_catalog();
        let bom = raw_requirements_by(&catalog, get(&catalog, "sword"), |a, b| {
            b.slug.cmp(a.slug)
        })
        .unwrap()
        .unwrap();

        assert_eq!(quantities(&bom), vec![("leather", 3), ("iron", 2)]);
    }

    #[test]
    fn diamonds_are_not_cycles() {
        let catalog = catalog(vec![
            terminal("dust"),
            crafted("shard", 1, &[("dust", 2)]),
            crafted("left", 1, &[("shard", 1)]),
            crafted("right", 1, &[("shard", 2)]),
            crafted("crown", 1, &[("left", 1), ("right", 1)]),
        ]);
        let bom = raw_requirements(&catalog, get(&catalog, "crown"))
            .unwrap()
            .unwrap();

        assert_eq!(quantities(&bom), vec![("dust", 6)]);
        assert_eq!(bom.gold_cost, 1 + (1 + 1) + (1 + 2));
    }

    #[test]
    fn cycles_fail_fast() {
        let catalog = catalog(vec![
            crafted("a", 1, &[("b", 1)]),
            crafted("b", 1, &[("c", 1)]),
            crafted("c", 1, &[("a", 1)]),
        ]);
        let err = raw_requirements(&catalog, get(&catalog, "a")).unwrap_err();

        assert_eq!(
            err,
            BomError::CyclicDependency {
                path: vec!["a".into(), "b".into(), "c".into(), "a".into()],
            }
        );
        assert_eq!(
            err.to_string(),
            "cyclic crafting dependency detected: a -> b -> c -> a"
        );
    }

    #[test]
    fn overflow_is_an_error() {
        let catalog = catalog(vec![
            terminal("grain"),
            crafted("sack", 0, &[("grain", u32::MAX)]),
            crafted("cart", 0, &[("sack", u32::MAX)]),
            crafted("barn", 0, &[("cart", u32::MAX)]),
        ]);
        let err = raw_requirements(&catalog, get(&catalog, "barn")).unwrap_err();

        assert_eq!(
            err,
            BomError::Overflow {
                item: "barn".into()
            }
        );
    }

    #[test]
    fn lookup_by_name() {
        let catalog = sword_catalog();

        let bom = raw_requirements_by_name::<Part, _>(&catalog, "hilt")
            .unwrap()
            .unwrap();
        assert_eq!(quantities(&bom), vec![("iron", 2)]);

        assert_eq!(
            raw_requirements_by_name::<Part, _>(&catalog, "spear"),
            Err(BomError::UnknownItem("spear".into()))
        );
        assert_eq!(
            direct_requirements_by_name::<Part, _>(&catalog, "sword").map(|direct| direct.len()),
            Ok(2)
        );
    }
}
