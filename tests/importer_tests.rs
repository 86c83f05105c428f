// Dependency tracking: the JSON side-cache, dependency mtimes and cache invalidation.

mod common;

use std::{
    fs,
    time::{Duration, SystemTime},
};

use common::Fixture;
use pretty_assertions::assert_eq;
use trellis::{
    config::Config,
    importer::{side_cache_path, DepsRecord},
    runtime::{Session, SharedOutput, Value},
};

fn touch_later(path: &std::path::Path, secs: u64) {
    let file = fs::File::options().write(true).open(path).unwrap();
    file.set_modified(SystemTime::now() + Duration::from_secs(secs)).unwrap();
}

#[test]
fn side_cache_records_macro_and_dialect_imports() {
    let fx = Fixture::new();
    let user = fx.write(
        "mypkg/user.trl",
        "from .macros import macros, double\nfrom mypkg.dialects import dialects, B\nx = 1\n",
    );
    let (session, _) = fx.session();

    session.importer().path_xstats(&session, &user).unwrap();
    let cache = side_cache_path(&user, session.config()).unwrap();
    assert!(cache.ends_with("mypkg/__trellis_cache__/user.trl.deps.json"));

    let record: DepsRecord = serde_json::from_str(&fs::read_to_string(&cache).unwrap()).unwrap();
    assert_eq!(record.macroimports.len(), 1);
    assert_eq!(record.dialectimports.len(), 1);
    assert!(record.has_relative_macroimports);
}

#[test]
fn stale_side_cache_is_rebuilt_after_an_edit() {
    let fx = Fixture::new();
    let user = fx.write("mypkg/user.trl", "x = 1\n");
    let (session, _) = fx.session();
    let importer = session.importer();
    let cache = side_cache_path(&user, session.config()).unwrap();

    let record = importer.deps_record(&session, &user).unwrap();
    assert!(record.macroimports.is_empty());
    assert!(cache.exists());

    fs::write(&user, "from .macros import macros, double\n").unwrap();
    touch_later(&user, 60);
    let record = importer.deps_record(&session, &user).unwrap();
    assert_eq!(record.macroimports.len(), 1);

    let on_disk: DepsRecord = serde_json::from_str(&fs::read_to_string(&cache).unwrap()).unwrap();
    assert_eq!(on_disk.macroimports.len(), 1);
    assert_eq!(on_disk.mtime_ns, record.mtime_ns);
}

#[test]
fn dependencies_resolve_to_definition_files() {
    let fx = Fixture::new();
    let user = fx.write(
        "mypkg/user.trl",
        "from .macros import macros, double\nfrom trellis.debug import macros, show_bindings\n",
    );
    let (session, _) = fx.session();

    let deps = session.importer().dependencies(&session, &user).unwrap();
    let modules: Vec<&str> = deps.iter().map(|d| d.module.as_str()).collect();
    assert_eq!(modules, vec!["mypkg.macros", "trellis.debug"]);
    assert!(deps[0].path.as_ref().unwrap().ends_with("mypkg/macros.trl"));
    assert_eq!(deps[1].path, None);
}

#[test]
fn editing_a_macro_definition_moves_the_dependency_mtime() {
    let fx = Fixture::new();
    let user = fx.write("mypkg/user.trl", "from .macros import macros, double\nx = double[2]\n");
    let (session, _) = fx.session();
    let importer = session.importer();

    let module = session.import_module("mypkg.user", false).unwrap();
    assert_eq!(module.get("x"), Some(Value::Int(4)));
    assert!(importer.is_code_cached(&user));
    let before = importer.path_xstats(&session, &user).unwrap();

    touch_later(&fx.path("mypkg/macros.trl"), 60);
    // Memoized until invalidated.
    assert_eq!(importer.path_xstats(&session, &user).unwrap(), before);

    importer.invalidate_xcaches();
    assert!(!importer.is_code_cached(&user));
    assert!(importer.path_xstats(&session, &user).unwrap() > before);
}

#[test]
fn reload_recompiles_after_an_edit() {
    let fx = Fixture::new();
    let user = fx.write("mypkg/user.trl", "x = 1\n");
    let (session, _) = fx.session();

    let module = session.import_module("mypkg.user", false).unwrap();
    assert_eq!(module.get("x"), Some(Value::Int(1)));

    fs::write(&user, "x = 2\n").unwrap();
    touch_later(&user, 60);
    session.importer().invalidate_xcaches();
    let module = session.import_module("mypkg.user", true).unwrap();
    assert_eq!(module.get("x"), Some(Value::Int(2)));
}

#[test]
fn side_cache_can_be_disabled() {
    let fx = Fixture::new();
    let user = fx.write("mypkg/user.trl", "from .macros import macros, double\n");
    let config = Config {
        write_side_cache: false,
        ..fx.config()
    };
    let session = Session::with_output(config, SharedOutput::null());

    session.importer().path_xstats(&session, &user).unwrap();
    assert!(!side_cache_path(&user, session.config()).unwrap().exists());
}

#[test]
fn configuration_loads_from_yaml() {
    let fx = Fixture::new();
    let path = fx.write(
        "trellis.yaml",
        "search_roots: [lib, vendor]\nmax_expansion_depth: 50\nsource_extension: trl\n",
    );
    let config = Config::from_yaml_file(&path).unwrap();
    assert_eq!(config.search_roots.len(), 2);
    assert_eq!(config.max_expansion_depth, Some(50));
    assert!(config.write_side_cache);

    let bad = fx.write("bad.yaml", "no_such_key: 1\n");
    assert!(Config::from_yaml_file(&bad).is_err());
}
