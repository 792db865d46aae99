//! Default service graph.
//!
//! # Keys
//! ```text
//! name, root, env           identity of the running application
//! dirs, params, config      layout and the loaded configuration tree
//! settings                  typed view of `config`
//! events                    lifecycle event bus
//! http, templates, models   collaborators driven by the boot phases
//! socket, tasks
//! http.modules              file-stem → code tables, empty by default
//! socket.modules
//! models.modules
//! http.middleware.*         tagged `http.middleware`, applied on listen
//! ```
//!
//! Applications override any key by registering over it before `boot()`.

use std::path::PathBuf;
use std::time::Duration;

use crate::config::{AppSettings, ConfigLoader, Params};
use crate::container::Container;
use crate::http::{self, HttpApp, Middleware, MIDDLEWARE_TAG};
use crate::layout::{Directories, Modules, Root};
use crate::lifecycle::Events;
use crate::models::Models;
use crate::socket::{SocketConnection, SocketServer};
use crate::tasks::TaskSupervisor;
use crate::templates::{Templates, GLOBAL_TAG};
use crate::tree::Value;

/// Environment variable naming the active environment.
pub const ENV_VAR: &str = "HEARTH_ENV";
pub const DEFAULT_ENV: &str = "development";

/// Build a container holding the kernel registrations for `name`.
pub fn container(name: &str, root: impl Into<PathBuf>, env: &str) -> Container {
    let container = Container::new();
    register(&container, name, root.into(), env);
    container
}

/// Register the kernel services into an existing container.
pub fn register(container: &Container, name: &str, root: PathBuf, env: &str) {
    container
        .set("name", name.to_string())
        .set("root", root)
        .set_tagged("env", &[GLOBAL_TAG], env.to_string())
        .set("events", Events::new());

    container.factory("dirs", |c| {
        let root = c.resolve::<PathBuf>("root")?;
        let name = c.resolve::<String>("name")?;
        Ok(Directories::new(root.as_path(), &name))
    });

    container.factory("params", |c| {
        let dirs = c.resolve::<Directories>("dirs")?;
        let env = c.resolve::<String>("env")?;
        Ok(Params::for_environment(&dirs, &env))
    });

    container.factory_tagged("config", &[GLOBAL_TAG], |c| {
        let dirs = c.resolve::<Directories>("dirs")?;
        let env = c.resolve::<String>("env")?;
        let params = c.resolve::<Params>("params")?;
        let name = c.resolve::<String>("name")?;
        let loader = ConfigLoader::new(&dirs, env.as_str(), (*params).clone());
        Ok::<Value, _>(loader.load(&name)?)
    });

    container.factory("settings", |c| {
        let config = c.resolve::<Value>("config")?;
        Ok(AppSettings::from_value(&config)?)
    });

    container.factory("http", |_| Ok(HttpApp::new()));

    container.factory("templates", |c| {
        let dirs = c.resolve::<Directories>("dirs")?;
        Ok(Templates::new(dirs.get(Root::Views)))
    });

    container.factory("models", |c| Ok(Models::new(c.resolve_path("config.orm")?)));

    container.factory("socket", |c| {
        let settings = c.resolve::<AppSettings>("settings")?;
        Ok(SocketServer::new(settings.socket.path.clone()))
    });

    container.factory("tasks", |c| {
        let settings = c.resolve::<AppSettings>("settings")?;
        let dirs = c.resolve::<Directories>("dirs")?;
        let name = c.resolve::<String>("name")?;
        let env = c.resolve::<String>("env")?;
        let root = c.resolve::<PathBuf>("root")?;
        let envs = vec![
            ("HEARTH_APP".to_string(), (*name).clone()),
            (ENV_VAR.to_string(), (*env).clone()),
            ("HEARTH_ROOT".to_string(), root.to_string_lossy().into_owned()),
        ];
        let supervisor = TaskSupervisor::from_config(&settings.tasks, envs);
        for file in &settings.tasks.files {
            supervisor.add(dirs.join(Root::Tasks, file));
        }
        Ok(supervisor)
    });

    container
        .set("http.modules", Modules::<HttpApp>::new())
        .set("socket.modules", Modules::<SocketConnection>::new())
        .set("models.modules", Modules::<Models>::new());

    // Applied in this order, so `trace` ends up outermost.
    container.factory_tagged("http.middleware.errors", &[MIDDLEWARE_TAG], |_| {
        Ok(http::middleware::errors())
    });
    container.factory_tagged("http.middleware.timeout", &[MIDDLEWARE_TAG], |c| {
        let settings = c.resolve::<AppSettings>("settings")?;
        Ok(http::middleware::timeout(Duration::from_secs(
            settings.http.request_timeout_secs,
        )))
    });
    container.factory_tagged("http.middleware.request_id", &[MIDDLEWARE_TAG], |_| {
        Ok(http::middleware::request_id())
    });
    container.factory_tagged("http.middleware.trace", &[MIDDLEWARE_TAG], |_| {
        Ok::<Middleware, _>(http::middleware::trace())
    });

    tracing::debug!(app = %name, env = %env, "Kernel services registered");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn fixture() -> tempfile::TempDir {
        let tmp = tempfile::tempdir().unwrap();
        fs::create_dir_all(tmp.path().join("config")).unwrap();
        fs::write(
            tmp.path().join("config/main.test.yml"),
            "@import: base.yml\nlog:\n  level: debug\npaths:\n  tasks: ${tasks}\n",
        )
        .unwrap();
        fs::write(
            tmp.path().join("config/base.yml"),
            "socket:\n  path: /ws\norm:\n  client: sqlite\n",
        )
        .unwrap();
        tmp
    }

    #[test]
    fn test_config_and_settings_resolve() {
        let tmp = fixture();
        let c = container("main", tmp.path(), "test");

        let settings = c.resolve::<AppSettings>("settings").unwrap();
        assert_eq!(settings.log.level, "debug");
        assert_eq!(settings.socket.path, "/ws");

        let tasks = c.resolve::<Value>("config.paths.tasks").unwrap();
        let expected = tmp.path().join("apps/main/tasks");
        assert_eq!(tasks.as_str(), Some(expected.to_string_lossy().as_ref()));
    }

    #[test]
    fn test_models_receive_orm_section() {
        let tmp = fixture();
        let c = container("main", tmp.path(), "test");

        let models = c.resolve::<Models>("models").unwrap();
        assert!(models.orm().is_some());
    }

    #[test]
    fn test_middleware_order() {
        let tmp = fixture();
        let c = container("main", tmp.path(), "test");
        assert_eq!(
            c.keys_by_tag(MIDDLEWARE_TAG),
            vec![
                "http.middleware.errors",
                "http.middleware.timeout",
                "http.middleware.request_id",
                "http.middleware.trace",
            ]
        );
        assert_eq!(c.tagged_as::<Middleware>(MIDDLEWARE_TAG).unwrap().len(), 4);
    }

    #[test]
    fn test_template_globals_include_env_and_config() {
        let tmp = fixture();
        let c = container("main", tmp.path(), "test");
        assert_eq!(c.keys_by_tag(GLOBAL_TAG), vec!["env", "config"]);
    }

    #[test]
    fn test_missing_config_fails_settings() {
        let tmp = tempfile::tempdir().unwrap();
        let c = container("main", tmp.path(), "test");
        assert!(c.resolve::<AppSettings>("settings").is_err());
    }
}
