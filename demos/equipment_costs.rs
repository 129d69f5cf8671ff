//! Loads `assets/equipment.ron`, then prints the direct and the fully flattened cost
//! of every craftable item.
//!
//! Run with `cargo run --example equipment_costs`.

use bevy::{app::AppExit, log::LogPlugin, prelude::*, state::app::StatesPlugin};
use equipment_manifest::{
    asset_state::CatalogLoadingState,
    bom::Craftable,
    equipment::EquipmentManifest,
    manifest::Manifest,
    plugin::{ManifestPlugin, RegisterManifest},
};

fn main() {
    App::new()
        // Only the asset, log and state plugins are needed to load catalogs.
        .add_plugins((
            MinimalPlugins,
            AssetPlugin::default(),
            LogPlugin::default(),
            StatesPlugin,
        ))
        .add_plugins(ManifestPlugin::<CatalogLoadingState>::default())
        .register_manifest::<EquipmentManifest>("equipment.ron")
        .add_systems(OnEnter(CatalogLoadingState::Ready), print_costs)
        .add_systems(OnEnter(CatalogLoadingState::Failed), exit)
        .run();
}

fn print_costs(manifest: Res<EquipmentManifest>, mut app_exit_events: EventWriter<AppExit>) {
    let mut craftable: Vec<_> = manifest.iter().filter(|item| item.is_craftable()).collect();
    craftable.sort_by(|a, b| a.bom_order(b));

    for item in craftable {
        info!("{} ({:?}):", item.name, item.quality);

        if let Ok(direct) = manifest.direct_requirements(&item.slug) {
            for requirement in direct {
                info!("  crafted from {} x{}", requirement.item.name, requirement.quantity);
            }
        }

        match manifest.raw_requirements(&item.slug) {
            Ok(Some(bom)) => {
                info!("  total gold: {}", bom.gold_cost);
                for requirement in &bom.required_items {
                    info!("  base {} x{}", requirement.item.name, requirement.quantity);
                }
                for missing in &bom.missing {
                    warn!("  missing component {missing}");
                }
            }
            Ok(None) => {}
            Err(err) => error!("  {err}"),
        }
    }

    info!("{} catalog entries in total.", manifest.len());
    app_exit_events.send_default();
}

fn exit(mut app_exit_events: EventWriter<AppExit>) {
    app_exit_events.send(AppExit::from_code(1));
}

#[cfg(test)]
mod tests {
    use bevy::ecs::world::World;
    use equipment_manifest::{
        equipment::{EquipmentManifest, RawEquipmentManifest},
        identifier::Id,
        manifest::Manifest,
    };

    #[test]
    fn bundled_catalog_is_valid() {
        let raw: RawEquipmentManifest =
            ron::de::from_str(include_str!("../assets/equipment.ron")).unwrap();
        let manifest = EquipmentManifest::from_raw_manifest(raw, &mut World::new()).unwrap();
        assert!(manifest.dangling_references().is_empty());

        let bom = manifest
            .raw_requirements("champions_blade")
            .unwrap()
            .unwrap();
        // 15000 + 2 * (100 + 50) + 2000
        assert_eq!(bom.gold_cost, 17_300);
        assert_eq!(bom.quantity_of(Id::from_name("iron")), 4);
        assert_eq!(bom.quantity_of(Id::from_name("leather")), 7);
        assert_eq!(bom.quantity_of(Id::from_name("mana_dust")), 7);
        assert_eq!(bom.quantity_of(Id::from_name("linen")), 4);
    }
}
