use hearth::config::AppSettings;
use hearth::{kernel, scaffold};

#[test]
fn test_scaffolded_app_configuration_loads() {
    let tmp = tempfile::tempdir().unwrap();
    scaffold::new_app(tmp.path(), "blog").unwrap();

    let development = kernel::container("blog", tmp.path(), "development");
    let settings = development.resolve::<AppSettings>("settings").unwrap();
    assert_eq!(settings.log.level, "debug");
    assert_eq!(settings.http.bind_address, "0.0.0.0:3000");

    let production = kernel::container("blog", tmp.path(), "production");
    let settings = production.resolve::<AppSettings>("settings").unwrap();
    assert!(settings.log.json);
    assert_eq!(settings.log.file.as_deref(), Some("production.log"));
}

#[tokio::test]
async fn test_scaffolded_app_boots() {
    let tmp = tempfile::tempdir().unwrap();
    scaffold::new_app(tmp.path(), "blog").unwrap();

    let app = hearth::launch::application("blog", tmp.path(), "development", |_| {})
        .handle_signals(false);
    app.boot().unwrap();
    assert_eq!(app.phases(), Default::default());
}
