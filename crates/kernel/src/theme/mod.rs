//! Theme registry and administration.
//!
//! Themes live in subdirectories of the themes root, each described by a
//! `version.toml`. The registry mirrors what is on disk; `regenerate`
//! reconciles the two.

pub mod admin;
pub mod ini;
pub mod reconcile;
pub mod running_config;
pub mod scaffold;
pub mod scanner;
pub mod store;
pub mod version_file;
pub mod view_cache;

pub use admin::ThemeAdmin;
pub use ini::IniDocument;
pub use reconcile::{ReconcileAction, ReconcileFailure, ReconcileReport, ThemeReconciler};
pub use running_config::{FsThemeConfig, ThemeConfigStore};
pub use scaffold::{ScaffoldFiles, ThemeScaffold};
pub use scanner::{ScanWarning, ScanWarningKind, ThemeScan, ThemeScanner};
pub use store::{MemoryThemeStore, PgThemeStore, ThemeStore};
pub use version_file::ThemeVersionFile;
pub use view_cache::ViewCache;

/// Permission component for theme administration.
pub const THEME_COMPONENT: &str = "Theme::";
