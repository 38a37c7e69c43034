use std::thread;
use std::time::Instant;

use orbeon_forms::{
    bind_once, bind_source, parse, CompileOptions, DecoderRegistry, OrbeonError, Runner,
    SchemaSource,
};

const DEFINITION: &str = include_str!("data/controls_definition.xml");
const INSTANCE: &str = include_str!("data/controls_instance.xml");

fn data_path(name: &str) -> std::path::PathBuf {
    let mut path = std::path::PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    path.push("tests");
    path.push("data");
    path.push(name);
    path
}

#[test]
fn files_bind_like_strings() {
    let options = CompileOptions::new("en");
    let runner = Runner::from_definition_file(
        data_path("controls_definition.xml"),
        &options,
        DecoderRegistry::new(),
    )
    .expect("compile");
    let from_file = runner
        .bind_file(data_path("controls_instance.xml"))
        .expect("bind file");
    let from_str = runner.bind_str(INSTANCE).expect("bind str");
    assert_eq!(
        from_file.to_json().expect("json"),
        from_str.to_json().expect("json")
    );
}

#[test]
fn missing_file_is_an_io_error() {
    let err = Runner::from_definition_file(
        data_path("does_not_exist.xml"),
        &CompileOptions::new("en"),
        DecoderRegistry::new(),
    )
    .unwrap_err();
    assert!(matches!(err, OrbeonError::Io { .. }), "{err}");
    assert!(err.to_string().contains("does_not_exist.xml"));
}

#[test]
fn fast_and_slow_paths_agree() {
    let options = CompileOptions::new("en");
    let decoders = DecoderRegistry::new();
    let runner = Runner::from_definition(DEFINITION, &options, decoders.clone()).expect("compile");
    let fast = runner.bind_str(INSTANCE).expect("fast");
    let slow = bind_once(DEFINITION, INSTANCE, &options, &decoders).expect("slow");
    assert_eq!(fast.to_json().expect("json"), slow.to_json().expect("json"));

    let definition = parse(DEFINITION).expect("parse");
    let instance = parse(INSTANCE).expect("parse");
    let via_source = bind_source(
        &instance,
        SchemaSource::Compiled(runner.schema()),
        &decoders,
    )
    .expect("source");
    assert_eq!(via_source.to_json().expect("json"), fast.to_json().expect("json"));
    let via_definition = bind_source(
        &instance,
        SchemaSource::Definition {
            document: &definition,
            options: &options,
        },
        &decoders,
    )
    .expect("definition");
    assert_eq!(via_definition.len(), fast.len());
}

#[test]
fn concurrent_binds_share_one_schema() {
    let runner = Runner::from_definition(DEFINITION, &CompileOptions::new("en"), DecoderRegistry::new())
        .expect("compile");
    let expected = runner.bind_str(INSTANCE).expect("bind").to_json().expect("json");

    thread::scope(|scope| {
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let runner = runner.clone();
                let rounds = fastrand::usize(5..20);
                scope.spawn(move || {
                    (0..rounds)
                        .map(|_| runner.bind_str(INSTANCE).expect("bind").to_json().expect("json"))
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        for handle in handles {
            for json in handle.join().expect("thread") {
                assert_eq!(json, expected);
            }
        }
    });
}

#[test]
fn compiled_schema_outpaces_recompiling() {
    const ROUNDS: usize = 1000;
    let options = CompileOptions::new("en");
    let decoders = DecoderRegistry::new();
    let runner = Runner::from_definition(DEFINITION, &options, decoders.clone()).expect("compile");
    let instance = parse(INSTANCE).expect("parse");

    let start = Instant::now();
    for _ in 0..ROUNDS {
        runner.bind(&instance).expect("fast");
    }
    let fast = start.elapsed();

    let start = Instant::now();
    for _ in 0..ROUNDS {
        let definition = parse(DEFINITION).expect("parse");
        bind_source(
            &instance,
            SchemaSource::Definition {
                document: &definition,
                options: &options,
            },
            &decoders,
        )
        .expect("slow");
    }
    let slow = start.elapsed();

    assert!(
        fast < slow,
        "binding {ROUNDS} instances took {fast:?} with a compiled schema and {slow:?} recompiling"
    );
}
