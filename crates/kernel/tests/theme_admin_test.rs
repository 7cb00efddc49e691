#![allow(clippy::unwrap_used, clippy::expect_used)]
//! Theme administration tests.

mod common;

use std::path::PathBuf;

use atrium_kernel::site::{DEFAULT_THEME, SiteVariables};
use atrium_kernel::theme::running_config::{
    PAGE_CONFIGURATIONS_FILE, PALETTES_FILE, RUNNING_CONFIG_DIR, VARIABLES_FILE,
};
use atrium_kernel::theme::view_cache::{CACHED_DIR, COMPILED_DIR};
use atrium_kernel::theme::{IniDocument, ThemeScaffold, ThemeStore};
use atrium_kernel::users::UserStore;
use atrium_kernel::{AdminError, MessageKind};
use atrium_test_utils::{admin_context, context_for, test_user};
use common::TestApp;

fn running_file(app: &TestApp, theme: &str, file: &str) -> PathBuf {
    app.site
        .cache_path()
        .join(RUNNING_CONFIG_DIR)
        .join(format!("{theme}_{file}"))
}

/// Register SeaBreeze with a full set of default configuration files.
async fn sea_breeze(app: &TestApp) {
    app.site.add_theme("SeaBreeze", "name = \"SeaBreeze\"\n");
    app.site
        .write_config_ini("SeaBreeze", VARIABLES_FILE, "[variables]\nlayout = \"wide\"\n");
    app.site
        .write_config_ini("SeaBreeze", PALETTES_FILE, "[default]\ncolor = \"#000000\"\n");
    app.site.write_config_ini(
        "SeaBreeze",
        PAGE_CONFIGURATIONS_FILE,
        "[master]\nfile = \"master.ini\"\n\n[home]\nfile = \"home.ini\"\n",
    );
    app.site
        .write_config_ini("SeaBreeze", "master.ini", "[page]\ntemplate = \"master.html\"\n");
    app.site
        .write_config_ini("SeaBreeze", "home.ini", "[page]\ntemplate = \"home.html\"\n");

    app.state
        .theme_reconciler()
        .regenerate(&admin_context())
        .await
        .unwrap();
}

#[tokio::test]
async fn test_list_requires_admin() {
    let editor = test_user("editor").build();
    let app = TestApp::builder().users([editor.clone()]).build();
    sea_breeze(&app).await;
    let admin = app.state.theme_admin();

    let themes = admin.list(&admin_context()).await.unwrap();
    assert_eq!(themes.len(), 1);

    let result = admin.list(&context_for(&editor)).await;
    assert!(matches!(result, Err(AdminError::PermissionDenied)));
}

#[tokio::test]
async fn test_links_depend_on_admin_access() {
    let editor = test_user("editor").build();
    let app = TestApp::new();
    let admin = app.state.theme_admin();

    let links = admin.links(&admin_context()).await.unwrap();
    let urls: Vec<_> = links.iter().map(|l| l.url.as_str()).collect();
    assert_eq!(urls, vec!["/admin/themes", "/admin/themes/settings"]);

    assert!(admin.links(&context_for(&editor)).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_update_settings_saves_record() {
    let app = TestApp::new();
    sea_breeze(&app).await;
    let admin = app.state.theme_admin();
    let ctx = admin_context();

    let mut record = app.themes.find_by_name("SeaBreeze").await.unwrap().unwrap();
    record.theme.display_name = "Sea Breeze".to_string();
    admin.update_settings(&ctx, &record).await.unwrap();

    let stored = app.themes.find_by_name("SeaBreeze").await.unwrap().unwrap();
    assert_eq!(stored.theme.display_name, "Sea Breeze");
}

#[tokio::test]
async fn test_set_as_default_with_user_reset() {
    let alice = test_user("alice").with_theme("Andreas08").build();
    let bob = test_user("bob").with_theme("SeaBreeze").build();
    let app = TestApp::builder().users([alice.clone(), bob.clone()]).build();
    let admin = app.state.theme_admin();
    let ctx = admin_context();

    admin.set_as_default(&ctx, "SeaBreeze", false).await.unwrap();
    assert_eq!(
        app.variables.get_string(DEFAULT_THEME).await.unwrap().as_deref(),
        Some("SeaBreeze")
    );
    assert_eq!(app.users.find(alice.id).await.unwrap().unwrap().theme, "Andreas08");

    admin.set_as_default(&ctx, "Andreas08", true).await.unwrap();
    assert_eq!(
        app.variables.get_string(DEFAULT_THEME).await.unwrap().as_deref(),
        Some("Andreas08")
    );
    assert!(app.users.snapshot().iter().all(|u| u.theme.is_empty()));
}

#[tokio::test]
async fn test_set_as_default_rejects_blank_name() {
    let app = TestApp::new();
    let ctx = admin_context();
    let result = app.state.theme_admin().set_as_default(&ctx, " ", false).await;
    assert!(matches!(result, Err(AdminError::InvalidArguments(_))));
    assert!(app.variables.get(DEFAULT_THEME).await.unwrap().is_none());
}

#[tokio::test]
async fn test_create_running_config_copies_every_file() {
    let app = TestApp::new();
    sea_breeze(&app).await;
    let ctx = admin_context();

    let written = app
        .state
        .theme_admin()
        .create_running_config(&ctx, "SeaBreeze")
        .await
        .unwrap();
    assert_eq!(
        written,
        vec![
            VARIABLES_FILE,
            PALETTES_FILE,
            PAGE_CONFIGURATIONS_FILE,
            "home.ini",
            "master.ini"
        ]
    );

    let vars = IniDocument::read(&running_file(&app, "SeaBreeze", VARIABLES_FILE))
        .await
        .unwrap();
    assert_eq!(vars.get("variables", "layout"), Some("wide"));
    assert!(running_file(&app, "SeaBreeze", "home.ini").is_file());
}

#[tokio::test]
async fn test_create_running_config_for_unknown_theme() {
    let app = TestApp::new();
    let ctx = admin_context();
    let result = app
        .state
        .theme_admin()
        .create_running_config(&ctx, "Nowhere")
        .await;
    assert!(matches!(result, Err(AdminError::InvalidArguments(_))));
}

#[tokio::test]
async fn test_delete_running_config_and_single_file() {
    let app = TestApp::new();
    sea_breeze(&app).await;
    let admin = app.state.theme_admin();
    let ctx = admin_context();
    admin.create_running_config(&ctx, "SeaBreeze").await.unwrap();

    assert!(admin.delete_ini_file(&ctx, "SeaBreeze", PALETTES_FILE).await.unwrap());
    assert!(!running_file(&app, "SeaBreeze", PALETTES_FILE).exists());
    assert!(!admin.delete_ini_file(&ctx, "SeaBreeze", PALETTES_FILE).await.unwrap());

    let result = admin.delete_ini_file(&ctx, "SeaBreeze", "../version.toml").await;
    assert!(matches!(result, Err(AdminError::InvalidArguments(_))));

    let mut removed = admin.delete_running_config(&ctx, "SeaBreeze").await.unwrap();
    removed.sort();
    assert_eq!(
        removed,
        vec!["home.ini", "master.ini", PAGE_CONFIGURATIONS_FILE, VARIABLES_FILE]
    );
    assert!(!running_file(&app, "SeaBreeze", VARIABLES_FILE).exists());
}

#[tokio::test]
async fn test_delete_page_configuration_assignment() {
    let app = TestApp::new();
    sea_breeze(&app).await;
    let ctx = admin_context();

    app.state
        .theme_admin()
        .delete_page_configuration_assignment(&ctx, "SeaBreeze", "home")
        .await
        .unwrap();

    let assignments = IniDocument::read(&running_file(&app, "SeaBreeze", PAGE_CONFIGURATIONS_FILE))
        .await
        .unwrap();
    assert!(assignments.section("home").is_none());
    assert_eq!(assignments.get("master", "file"), Some("master.ini"));
}

#[tokio::test]
async fn test_delete_unregisters_and_cleans_up() {
    let fan = test_user("fan").with_theme("SeaBreeze").build();
    let other = test_user("other").with_theme("Andreas08").build();
    let app = TestApp::builder().users([fan.clone(), other.clone()]).build();
    sea_breeze(&app).await;
    let admin = app.state.theme_admin();
    let ctx = admin_context();
    admin.create_running_config(&ctx, "SeaBreeze").await.unwrap();
    app.site.write_view_cache(COMPILED_DIR, "page.php");
    app.site.write_view_cache(CACHED_DIR, "home.html");

    admin.delete(&ctx, "SeaBreeze", false).await.unwrap();

    assert!(app.themes.find_by_name("SeaBreeze").await.unwrap().is_none());
    assert_eq!(app.users.find(fan.id).await.unwrap().unwrap().theme, "");
    assert_eq!(app.users.find(other.id).await.unwrap().unwrap().theme, "Andreas08");
    assert!(!running_file(&app, "SeaBreeze", VARIABLES_FILE).exists());
    assert!(!running_file(&app, "SeaBreeze", "home.ini").exists());
    assert!(!app.site.cache_path().join(COMPILED_DIR).join("page.php").exists());
    assert!(!app.site.cache_path().join(CACHED_DIR).join("home.html").exists());
    // Files stay on disk unless asked for.
    assert!(app.site.theme_path("SeaBreeze").is_dir());
}

#[tokio::test]
async fn test_delete_with_files_removes_directory() {
    let app = TestApp::new();
    sea_breeze(&app).await;
    let ctx = admin_context();

    app.state
        .theme_admin()
        .delete(&ctx, "SeaBreeze", true)
        .await
        .unwrap();

    assert!(!app.site.theme_path("SeaBreeze").exists());
    assert!(
        ctx.messages()
            .of_kind(MessageKind::Status)
            .contains(&"Done! Removed theme files from the file system.".to_string())
    );
}

#[tokio::test]
async fn test_delete_unknown_theme_is_not_found() {
    let app = TestApp::new();
    let ctx = admin_context();
    let result = app.state.theme_admin().delete(&ctx, "Nowhere", false).await;
    assert!(matches!(result, Err(AdminError::NotFound(_))));
    assert_eq!(
        ctx.messages().of_kind(MessageKind::Error),
        vec!["Sorry! No such item found.".to_string()]
    );
}

#[tokio::test]
async fn test_delete_files_rejects_path_components() {
    let app = TestApp::new();
    let ctx = admin_context();
    let result = app
        .state
        .theme_admin()
        .delete_files(&ctx, "SeaBreeze", "../cache")
        .await;
    assert!(matches!(result, Err(AdminError::InvalidArguments(_))));
    assert!(app.site.cache_path().is_dir());
}

#[tokio::test]
async fn test_create_then_regenerate_registers_theme() {
    let app = TestApp::new();
    let admin = app.state.theme_admin();
    let ctx = admin_context();

    let scaffold = ThemeScaffold {
        name: "Night Sky".to_string(),
        contact: Some("themes@example.com".to_string()),
        ..Default::default()
    };
    let root = admin.create(&ctx, &scaffold).await.unwrap();
    assert_eq!(root, app.site.theme_path("Night_Sky"));
    assert!(root.join("templates").join("master.html").is_file());
    assert!(root.join("locale").join("theme_Night_Sky.pot").is_file());

    let report = app.state.theme_reconciler().regenerate(&ctx).await.unwrap();
    assert_eq!(report.inserted, vec!["Night_Sky"]);

    let theme = app.themes.find_by_name("Night_Sky").await.unwrap().unwrap().theme;
    assert_eq!(theme.display_name, "Night Sky");
    assert_eq!(theme.version, "1.0");
    assert_eq!(theme.contact, "themes@example.com");

    let again = admin.create(&ctx, &scaffold).await;
    assert!(matches!(again, Err(AdminError::InvalidArguments(_))));
}

#[tokio::test]
async fn test_create_requires_name() {
    let app = TestApp::new();
    let ctx = admin_context();
    let result = app
        .state
        .theme_admin()
        .create(&ctx, &ThemeScaffold::default())
        .await;
    assert!(matches!(result, Err(AdminError::InvalidArguments(_))));
    assert_eq!(
        ctx.messages().of_kind(MessageKind::Error),
        vec!["Error! You must enter at least the theme name".to_string()]
    );
}

#[tokio::test]
async fn test_create_over_unregistered_directory_fails() {
    let app = TestApp::new();
    app.site.add_plain_dir("Night_Sky");
    let ctx = admin_context();

    let scaffold = ThemeScaffold {
        name: "Night_Sky".to_string(),
        ..Default::default()
    };
    let result = app.state.theme_admin().create(&ctx, &scaffold).await;
    assert!(matches!(result, Err(AdminError::Persistence(_))));
}
