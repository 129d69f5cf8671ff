use bevy::state::state::{FreelyMutableState, States};

/// Maps your app's [`States`] onto the steps of catalog loading.
///
/// The plugin sets these states through [`NextState`](bevy::state::state::NextState),
/// so they must be [`FreelyMutableState`]. `#[derive(States)]` implements both.
///
/// [`ManifestPlugin`](crate::plugin::ManifestPlugin) moves the app through these states
/// as catalog files load and are validated.
/// Apps that already have a loading screen state machine implement this on their own enum;
/// everything else can use [`CatalogLoadingState`].
pub trait AssetLoadingState: States + FreelyMutableState {
    /// Catalog files are being read from disk.
    const LOADING: Self;
    /// Catalog files are loaded and being validated into manifests.
    const PROCESSING: Self;
    /// Every registered manifest is available as a resource.
    const READY: Self;
    /// A catalog file failed to load or was rejected.
    ///
    /// The reason is logged.
    const FAILED: Self;
}

/// A ready-made [`AssetLoadingState`] for tools that only load catalogs.
#[derive(PartialEq, Eq, Debug, Hash, Clone, Copy, Default, States)]
pub enum CatalogLoadingState {
    /// Catalog files are being read from disk.
    #[default]
    Loading,
    /// Catalog files are being validated.
    Validating,
    /// The catalogs can be queried.
    Ready,
    /// Loading or validation failed.
    Failed,
}

impl AssetLoadingState for CatalogLoadingState {
    const LOADING: Self = CatalogLoadingState::Loading;
    const PROCESSING: Self = CatalogLoadingState::Validating;
    const READY: Self = CatalogLoadingState::Ready;
    const FAILED: Self = CatalogLoadingState::Failed;
}
