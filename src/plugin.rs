use std::any::{type_name, TypeId};
use std::path::PathBuf;

use bevy::app::{App, Plugin, PreUpdate, Update};
use bevy::asset::{AssetApp, AssetLoadFailedEvent, AssetServer, Assets, LoadState, UntypedHandle};
use bevy::ecs::prelude::*;
use bevy::ecs::system::SystemState;
use bevy::log::{debug, error, error_once, info};
use bevy::state::app::AppExtStates;
use bevy::state::condition::in_state;
use bevy::state::state::NextState;
use bevy::utils::HashMap;

use crate::asset_state::AssetLoadingState;
use crate::manifest::Manifest;

/// Loads catalog files and turns them into [`Manifest`] resources.
///
/// Add this plugin once, then call [`register_manifest`](RegisterManifest::register_manifest)
/// for every catalog the app needs.
/// The app moves from `S::LOADING` to `S::PROCESSING` once every registered file has loaded,
/// and from there to `S::READY` once every manifest has been validated.
/// Any failure moves it to `S::FAILED` instead.
#[derive(Debug)]
pub struct ManifestPlugin<S: AssetLoadingState> {
    /// Advance through the loading states automatically.
    ///
    /// Turn this off to drive [`NextState`] yourself, e.g. to wait on other assets too.
    /// Defaults to `true`.
    pub automatically_advance_states: bool,
    /// Insert `S::LOADING` as the initial state.
    ///
    /// Turn this off when the app starts in its own state and enters `S::LOADING` later.
    /// Defaults to `true`.
    pub set_initial_state: bool,
    /// Marker for the state type.
    pub _phantom: std::marker::PhantomData<S>,
}

impl<S: AssetLoadingState> ManifestPlugin<S> {
    /// A plugin that advances states automatically, optionally without inserting the initial state.
    pub fn new(set_initial_state: bool) -> Self {
        Self {
            set_initial_state,
            ..Self::default()
        }
    }
}

impl<S> Default for ManifestPlugin<S>
where
    S: AssetLoadingState,
{
    fn default() -> Self {
        Self {
            automatically_advance_states: true,
            set_initial_state: true,
            _phantom: std::marker::PhantomData,
        }
    }
}

impl<S: AssetLoadingState> Plugin for ManifestPlugin<S> {
    fn build(&self, app: &mut App) {
        if self.set_initial_state {
            app.insert_state(S::LOADING);
        }

        app.init_resource::<RawManifestTracker>().configure_sets(
            PreUpdate,
            ProcessManifestSet.run_if(in_state(S::PROCESSING)),
        );

        if self.automatically_advance_states {
            app.add_systems(
                Update,
                check_if_manifests_have_loaded::<S>.run_if(in_state(S::LOADING)),
            )
            .add_systems(
                Update,
                check_if_manifests_are_processed::<S>.run_if(in_state(S::PROCESSING)),
            );
        }
    }
}

/// Registers catalogs with an [`App`].
pub trait RegisterManifest {
    /// Queues the raw manifest of `M` at `path` for loading, and schedules its conversion into `M`.
    ///
    /// The path is relative to the `assets` folder. [`ManifestPlugin`] must already be added.
    fn register_manifest<M: Manifest>(&mut self, path: impl Into<PathBuf>) -> &mut Self;

    /// Schedules the conversion of a raw manifest that is already in memory.
    ///
    /// The catalog counts as loaded straight away, so it only waits on validation.
    /// Useful for generated catalogs and for tests.
    fn register_raw_manifest<M: Manifest>(&mut self, raw_manifest: M::RawManifest) -> &mut Self;
}

/// The system set of all [`process_manifest`] systems, whatever their manifest type.
///
/// `register_manifest` does not know the loading state type,
/// so the run condition is set on this set instead.
#[derive(SystemSet, PartialEq, Eq, Hash, Debug, Clone)]
struct ProcessManifestSet;

fn add_manifest_systems<M: Manifest>(app: &mut App) {
    app.init_asset::<M::RawManifest>()
        .add_systems(
            Update,
            report_failed_raw_manifest_loading::<M>
                .run_if(on_event::<AssetLoadFailedEvent<M::RawManifest>>()),
        )
        .add_systems(
            PreUpdate,
            process_manifest::<M>
                .in_set(ProcessManifestSet)
                .run_if(not(resource_exists::<M>)),
        );
}

impl RegisterManifest for App {
    fn register_manifest<M: Manifest>(&mut self, path: impl Into<PathBuf>) -> &mut Self {
        add_manifest_systems::<M>(self);

        // The raw asset type is always known, so loaders do not need file extensions.
        match M::FORMAT {
            #[cfg(feature = "ron")]
            crate::manifest::ManifestFormat::Ron => {
                self.add_plugins(
                    bevy_common_assets::ron::RonAssetPlugin::<M::RawManifest>::new(&[]),
                );
            }
            #[cfg(feature = "json")]
            crate::manifest::ManifestFormat::Json => {
                self.add_plugins(
                    bevy_common_assets::json::JsonAssetPlugin::<M::RawManifest>::new(&[]),
                );
            }
            #[cfg(feature = "yaml")]
            crate::manifest::ManifestFormat::Yaml => {
                self.add_plugins(
                    bevy_common_assets::yaml::YamlAssetPlugin::<M::RawManifest>::new(&[]),
                );
            }
            #[cfg(feature = "toml")]
            crate::manifest::ManifestFormat::Toml => {
                self.add_plugins(
                    bevy_common_assets::toml::TomlAssetPlugin::<M::RawManifest>::new(&[]),
                );
            }
            #[cfg(feature = "csv")]
            crate::manifest::ManifestFormat::Csv => {
                self.add_plugins(
                    bevy_common_assets::csv::CsvAssetPlugin::<M::RawManifest>::new(&[]),
                );
            }
            #[cfg(feature = "xml")]
            crate::manifest::ManifestFormat::Xml => {
                self.add_plugins(
                    bevy_common_assets::xml::XmlAssetPlugin::<M::RawManifest>::new(&[]),
                );
            }
            #[cfg(feature = "msgpack")]
            crate::manifest::ManifestFormat::MsgPack => {
                self.add_plugins(bevy_common_assets::msgpack::MsgPackAssetPlugin::<
                    M::RawManifest,
                >::new(&[]));
            }
            crate::manifest::ManifestFormat::Custom => (),
        }

        self.world_mut().resource_scope(|world, asset_server: Mut<AssetServer>| {
            let mut tracker = world.resource_mut::<RawManifestTracker>();
            tracker.register::<M>(path, &asset_server);
        });

        self
    }

    fn register_raw_manifest<M: Manifest>(&mut self, raw_manifest: M::RawManifest) -> &mut Self {
        add_manifest_systems::<M>(self);

        let handle = self
            .world_mut()
            .resource_mut::<Assets<M::RawManifest>>()
            .add(raw_manifest)
            .untyped();
        self.world_mut()
            .resource_mut::<RawManifestTracker>()
            .register_loaded::<M>(handle);

        self
    }
}

/// Loading and processing progress of every registered catalog.
#[derive(Resource, Debug, Default)]
pub struct RawManifestTracker {
    raw_manifests: HashMap<TypeId, RawManifestStatus>,
}

/// Where a single manifest is in its conversion from raw data.
#[derive(Debug, Default, PartialEq, Clone, Copy)]
pub enum ProcessingStatus {
    /// Not converted yet.
    #[default]
    Processing,
    /// Converted and inserted as a resource.
    Ready,
    /// Rejected during conversion.
    Failed,
}

/// Progress of one registered catalog.
#[derive(Debug, Clone)]
pub struct RawManifestStatus {
    /// The catalog file, relative to the assets folder.
    ///
    /// [`None`] for catalogs registered from memory.
    pub path: Option<PathBuf>,
    /// Keeps the raw asset alive until it is processed.
    pub handle: UntypedHandle,
    /// The last known load state of the file.
    pub load_state: LoadState,
    /// Whether the manifest has been converted.
    pub processing_status: ProcessingStatus,
}

impl RawManifestTracker {
    /// Starts loading the raw manifest of `M` from `path`.
    pub fn register<M: Manifest>(&mut self, path: impl Into<PathBuf>, asset_server: &AssetServer) {
        let path: PathBuf = path.into();
        let handle = asset_server.load::<M::RawManifest>(path.clone()).untyped();

        self.raw_manifests.insert(
            TypeId::of::<M>(),
            RawManifestStatus {
                path: Some(path),
                handle,
                load_state: LoadState::Loading,
                processing_status: ProcessingStatus::Processing,
            },
        );
    }

    /// Tracks a raw manifest of `M` that was added to its [`Assets`] directly.
    pub fn register_loaded<M: Manifest>(&mut self, handle: UntypedHandle) {
        self.raw_manifests.insert(
            TypeId::of::<M>(),
            RawManifestStatus {
                path: None,
                handle,
                load_state: LoadState::Loaded,
                processing_status: ProcessingStatus::Processing,
            },
        );
    }

    /// The progress of `M`, if it was registered.
    pub fn status<M: Manifest>(&self) -> Option<&RawManifestStatus> {
        self.raw_manifests.get(&TypeId::of::<M>())
    }

    /// Iterates over every registered catalog.
    pub fn iter(&self) -> impl Iterator<Item = (&TypeId, &RawManifestStatus)> {
        self.raw_manifests.iter()
    }

    /// Refreshes the load state of every registered catalog.
    ///
    /// Assets the server does not track, such as those registered from memory,
    /// keep their last known state.
    pub fn update_load_states(&mut self, asset_server: &AssetServer) {
        for status in self.raw_manifests.values_mut() {
            if let Some(load_state) = asset_server.get_load_state(&status.handle) {
                status.load_state = load_state;
            }
        }
    }

    /// Returns true if every registered catalog file has loaded.
    pub fn all_manifests_loaded(&mut self, asset_server: &AssetServer) -> bool {
        self.update_load_states(asset_server);

        self.raw_manifests
            .values()
            .all(|status| matches!(status.load_state, LoadState::Loaded))
    }

    /// Returns true if any registered catalog file failed to load.
    pub fn any_manifests_failed(&mut self, asset_server: &AssetServer) -> bool {
        self.update_load_states(asset_server);

        self.raw_manifests
            .values()
            .any(|status| matches!(status.load_state, LoadState::Failed(_)))
    }

    /// The combined processing status: failed if any manifest failed, ready once all are ready.
    pub fn processing_status(&self) -> ProcessingStatus {
        let statuses = self
            .raw_manifests
            .values()
            .map(|status| status.processing_status);
        combine_statuses(statuses)
    }

    /// Records the processing status of `M`.
    pub fn set_processing_status<M: Manifest>(&mut self, processing_status: ProcessingStatus) {
        if let Some(status) = self.raw_manifests.get_mut(&TypeId::of::<M>()) {
            status.processing_status = processing_status;
        }
    }
}

fn combine_statuses(statuses: impl Iterator<Item = ProcessingStatus>) -> ProcessingStatus {
    let mut combined = ProcessingStatus::Ready;
    for status in statuses {
        match status {
            ProcessingStatus::Failed => return ProcessingStatus::Failed,
            ProcessingStatus::Processing => combined = ProcessingStatus::Processing,
            ProcessingStatus::Ready => {}
        }
    }
    combined
}

/// Moves to `S::PROCESSING` once every catalog file has loaded,
/// or to `S::FAILED` if one could not be loaded.
pub fn check_if_manifests_have_loaded<S: AssetLoadingState>(
    asset_server: Res<AssetServer>,
    mut raw_manifest_tracker: ResMut<RawManifestTracker>,
    mut next_state: ResMut<NextState<S>>,
) {
    if raw_manifest_tracker.any_manifests_failed(asset_server.as_ref()) {
        error!("Some catalog files failed to load.");
        next_state.set(S::FAILED);
    } else if raw_manifest_tracker.all_manifests_loaded(asset_server.as_ref()) {
        info!("All catalog files have been loaded.");
        next_state.set(S::PROCESSING);
    }
}

/// Moves to `S::READY` once every manifest is built, or to `S::FAILED` if one was rejected.
pub fn check_if_manifests_are_processed<S: AssetLoadingState>(
    raw_manifest_tracker: Res<RawManifestTracker>,
    mut next_state: ResMut<NextState<S>>,
) {
    match raw_manifest_tracker.processing_status() {
        ProcessingStatus::Failed => {
            error!("Some catalogs were rejected during validation.");
            next_state.set(S::FAILED);
        }
        ProcessingStatus::Ready => {
            info!("All catalogs are ready.");
            next_state.set(S::READY);
        }
        ProcessingStatus::Processing => {}
    }
}

/// Logs why a catalog file failed to load.
///
/// [`LoadState::Failed`] is not enough on its own to tell which file broke and why.
pub fn report_failed_raw_manifest_loading<M: Manifest>(
    mut events: EventReader<AssetLoadFailedEvent<M::RawManifest>>,
) {
    for event in events.read() {
        error_once!(
            "Failed to load catalog file {} due to {:?}",
            event.path,
            event.error
        );
    }
}

/// Converts the loaded raw manifest of `M` and inserts the result as a [`Resource`].
///
/// The raw asset is removed from [`Assets`] in the process.
/// A manifest that was rejected once is not processed again.
pub fn process_manifest<M: Manifest>(
    world: &mut World,
    system_state: &mut SystemState<(Res<RawManifestTracker>, ResMut<Assets<M::RawManifest>>)>,
) {
    let (raw_manifest_tracker, mut assets) = system_state.get_mut(world);
    let Some(status) = raw_manifest_tracker.status::<M>() else {
        error_once!(
            "The manifest type {} was never registered.",
            type_name::<M>()
        );
        return;
    };
    if status.processing_status != ProcessingStatus::Processing {
        return;
    }

    debug!("Processing manifest of type {}.", type_name::<M>());
    let typed_handle = status.handle.clone_weak().typed::<M::RawManifest>();
    let Some(raw_manifest) = assets.remove(&typed_handle) else {
        error_once!(
            "The raw manifest for {} is missing from its asset collection.",
            type_name::<M>()
        );
        return;
    };

    let processing_status = match M::from_raw_manifest(raw_manifest, world) {
        Ok(manifest) => {
            info!(
                "Built {} with {} entries.",
                type_name::<M>(),
                manifest.len()
            );
            world.insert_resource(manifest);
            ProcessingStatus::Ready
        }
        Err(err) => {
            error_once!("Failed to process {}: {}", type_name::<M>(), err);
            ProcessingStatus::Failed
        }
    };

    world
        .resource_mut::<RawManifestTracker>()
        .set_processing_status::<M>(processing_status);
}

#[cfg(test)]
mod tests {
    use bevy::asset::{AssetPlugin, Handle};
    use bevy::state::app::StatesPlugin;
    use bevy::state::state::State;
    use bevy::prelude::MinimalPlugins;

    use super::*;
    use crate::asset_state::CatalogLoadingState;
    use crate::equipment::{EquipmentManifest, RawEquipmentManifest};
    use crate::manifest::NamedManifest;
    use ProcessingStatus::*;

    const VALID_CATALOG: &str = r#"(items: [
        (id: "iron", name: "Iron"),
        (id: "hilt", name: "Hilt", crafting_recipe: Some((gold_cost: 50, components: [
            (item: "iron", quantity: 2),
        ]))),
    ])"#;

    const CYCLIC_CATALOG: &str = r#"(items: [
        (id: "egg", name: "Egg", crafting_recipe: Some((components: [(item: "hen", quantity: 1)]))),
        (id: "hen", name: "Hen", crafting_recipe: Some((components: [(item: "egg", quantity: 1)]))),
    ])"#;

    fn raw_catalog(source: &str) -> RawEquipmentManifest {
        ron::de::from_str(source).unwrap()
    }

    fn app_with(plugin: ManifestPlugin<CatalogLoadingState>, source: &str) -> App {
        let mut app = App::new();
        app.add_plugins((MinimalPlugins, AssetPlugin::default(), StatesPlugin))
            .add_plugins(plugin)
            .register_raw_manifest::<EquipmentManifest>(raw_catalog(source));
        app
    }

    fn state(app: &App) -> CatalogLoadingState {
        *app.world().resource::<State<CatalogLoadingState>>().get()
    }

    fn run_until(app: &mut App, target: CatalogLoadingState) -> bool {
        for _ in 0..10 {
            app.update();
            if state(app) == target {
                return true;
            }
        }
        false
    }

    #[test]
    fn nothing_registered_is_ready() {
        assert_eq!(combine_statuses(std::iter::empty()), Ready);
    }

    #[test]
    fn one_pending_manifest_holds_back_the_rest() {
        assert_eq!(
            combine_statuses([Ready, Processing, Ready].into_iter()),
            Processing
        );
    }

    #[test]
    fn any_failure_wins() {
        assert_eq!(
            combine_statuses([Processing, Failed, Ready].into_iter()),
            Failed
        );
    }

    #[test]
    fn all_ready() {
        assert_eq!(combine_statuses([Ready, Ready].into_iter()), Ready);
    }

    #[test]
    fn in_memory_catalog_reaches_ready() {
        let mut app = app_with(ManifestPlugin::default(), VALID_CATALOG);
        app.update();
        assert_eq!(state(&app), CatalogLoadingState::Loading);

        assert!(run_until(&mut app, CatalogLoadingState::Validating));
        assert!(run_until(&mut app, CatalogLoadingState::Ready));

        let manifest = app.world().resource::<EquipmentManifest>();
        assert_eq!(manifest.len(), 2);
        assert!(manifest.get_by_name("hilt").is_some());

        let tracker = app.world().resource::<RawManifestTracker>();
        let status = tracker.status::<EquipmentManifest>().unwrap();
        assert_eq!(status.processing_status, Ready);
        assert_eq!(status.path, None);
    }

    #[test]
    fn rejected_catalog_reaches_failed() {
        let mut app = app_with(ManifestPlugin::default(), CYCLIC_CATALOG);

        assert!(run_until(&mut app, CatalogLoadingState::Failed));
        assert!(!app.world().contains_resource::<EquipmentManifest>());
    }

    #[test]
    fn rejected_catalog_is_not_processed_again() {
        let plugin = ManifestPlugin {
            automatically_advance_states: false,
            ..ManifestPlugin::default()
        };
        let mut app = app_with(plugin, CYCLIC_CATALOG);
        app.world_mut()
            .resource_mut::<NextState<CatalogLoadingState>>()
            .set(CatalogLoadingState::Validating);
        assert!(run_until(&mut app, CatalogLoadingState::Validating));
        app.update();

        let handle: Handle<RawEquipmentManifest> = {
            let tracker = app.world().resource::<RawManifestTracker>();
            let status = tracker.status::<EquipmentManifest>().unwrap();
            assert_eq!(status.processing_status, Failed);
            status.handle.clone().typed()
        };

        // Put a valid catalog back under the same handle: it must be left alone.
        app.world_mut()
            .resource_mut::<Assets<RawEquipmentManifest>>()
            .insert(&handle, raw_catalog(VALID_CATALOG));
        app.update();
        app.update();

        assert_eq!(state(&app), CatalogLoadingState::Validating);
        assert!(!app.world().contains_resource::<EquipmentManifest>());
        assert!(app
            .world()
            .resource::<Assets<RawEquipmentManifest>>()
            .contains(&handle));
    }
}
