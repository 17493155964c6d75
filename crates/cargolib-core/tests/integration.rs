use cargolib_core::{
    create_cargo_lib, CargoLib, ContainerError, FacadeError, IdentityError, IdentityKind,
    IdentityOptions, UserApi,
};
use cargolib_crypto::MnemonicError;
use cargolib_schema::{CargoConfig, ConfigError, ConfigFormat, ContainerFilter, MountState};
use cargolib_store::{FileLss, LocalSecureStorage, MemoryLss};
use std::path::Path;
use std::sync::{Arc, Barrier};
use std::thread;

const PHRASE: &str =
    "update inherit giant spray expire enforce animal ship congress weather camp endless";

const S3_TEMPLATE: &str = r#"{
    "backend_type": "s3",
    "name": "team bucket",
    "template": {
        "access": [{"user": "*"}],
        "credentials": {"access-key": "AKIA0000", "secret-key": "s3cr3t"},
        "manifest-pattern": {"path": "/{path}.yaml", "type": "glob"},
        "read-only": false,
        "s3_url": "s3://bucket/{{ OWNER }}/{{ CONTAINER_UUID }}",
        "label": "{{ CONTAINER_NAME }} ({{ ACCESS_MODE }}) {{ PATHS }}",
        "with-index": true
    }
}"#;

fn memory_api() -> UserApi {
    let lib = create_cargo_lib(Arc::new(MemoryLss::new()), CargoConfig::default()).unwrap();
    lib.user_api().unwrap()
}

fn file_lib(path: &Path) -> CargoLib {
    let lss = FileLss::open(path).unwrap();
    create_cargo_lib(Arc::new(lss), CargoConfig::default()).unwrap()
}

#[test]
fn my_mac_identity_from_known_phrase() {
    let api = memory_api();
    let mnemonic = api.mnemonic_from_phrase(PHRASE).unwrap();
    let pair = api.create_identity_from_mnemonic(&mnemonic, "My Mac").unwrap();

    assert_eq!(pair.device.name(), "My Mac");
    assert_eq!(pair.device.kind(), IdentityKind::Device);
    assert_eq!(pair.forest.kind(), IdentityKind::Forest);
    assert_eq!(pair.forest.name(), "");
    assert_eq!(
        pair.device.forest_fingerprint(),
        Some(pair.forest.fingerprint())
    );
    assert_ne!(pair.forest.fingerprint(), pair.device.fingerprint());

    let current = api.get_current_identity().unwrap().unwrap();
    assert!(current.forest.is_same(&pair.forest));
    assert!(current.device.is_same(&pair.device));
}

#[test]
fn recreating_from_same_phrase_gives_same_fingerprints() {
    let first = memory_api();
    let second = memory_api();
    let words: Vec<&str> = PHRASE.split(' ').collect();

    let a = first
        .create_identity_from_mnemonic(&first.mnemonic_from_words(&words).unwrap(), "My Mac")
        .unwrap();
    let b = second
        .create_identity_from_mnemonic(&second.mnemonic_from_phrase(PHRASE).unwrap(), "My Mac")
        .unwrap();

    assert_eq!(a.forest.fingerprint(), b.forest.fingerprint());
    assert_eq!(a.device.fingerprint(), b.device.fingerprint());
    assert_eq!(a.forest.public_key(), b.forest.public_key());
}

#[test]
fn device_name_changes_device_but_not_forest() {
    let api = memory_api();
    let mnemonic = api.mnemonic_from_phrase(PHRASE).unwrap();
    let mac = api.create_identity_from_mnemonic(&mnemonic, "My Mac").unwrap();
    let phone = api
        .create_identity_from_mnemonic_with(
            &mnemonic,
            "My Phone",
            IdentityOptions { overwrite: true },
        )
        .unwrap();
    assert_eq!(mac.forest.fingerprint(), phone.forest.fingerprint());
    assert_ne!(mac.device.fingerprint(), phone.device.fingerprint());
}

#[test]
fn second_identity_requires_overwrite() {
    let api = memory_api();
    let mnemonic = api.generate_mnemonic();
    api.create_identity_from_mnemonic(&mnemonic, "One").unwrap();
    assert!(matches!(
        api.create_identity_from_mnemonic(&mnemonic, "Two")
            .unwrap_err(),
        IdentityError::AlreadyExists
    ));
    assert_eq!(
        api.get_current_identity().unwrap().unwrap().device.name(),
        "One"
    );
}

#[test]
fn eleven_words_are_rejected() {
    let api = memory_api();
    let words: Vec<&str> = PHRASE.split(' ').take(11).collect();
    assert_eq!(
        api.mnemonic_from_words(&words).unwrap_err(),
        MnemonicError::InvalidWordCount(11)
    );
}

#[test]
fn unknown_word_is_rejected_and_nothing_is_stored() {
    let api = memory_api();
    let phrase = PHRASE.replace("spray", "sprayx");
    assert!(matches!(
        api.mnemonic_from_phrase(&phrase).unwrap_err(),
        MnemonicError::UnknownWord { index: 3, .. }
    ));
    assert!(api.get_current_identity().unwrap().is_none());
}

#[test]
fn entropy_identity_is_recoverable_from_its_mnemonic() {
    let api = memory_api();
    let (mnemonic, pair) = api
        .create_identity_from_entropy(&[42u8; 32], "Laptop")
        .unwrap();
    assert!(api.remove_identity().unwrap());
    assert!(api.get_current_identity().unwrap().is_none());

    let recovered = api
        .create_identity_from_mnemonic(
            &api.mnemonic_from_phrase(&mnemonic.phrase()).unwrap(),
            "Laptop",
        )
        .unwrap();
    assert_eq!(recovered.device.fingerprint(), pair.device.fingerprint());

    assert!(matches!(
        api.create_identity_from_entropy(&[1u8; 8], "Short")
            .unwrap_err(),
        IdentityError::Mnemonic(MnemonicError::EntropyTooLow(8))
    ));
}

#[test]
fn networked_catalog_without_connection_string_is_invalid() {
    let err = CargoLib::builder()
        .lss(Arc::new(MemoryLss::new()))
        .config_document(
            b"catalog_backend = \"redis\"\nuse_logger = false\n",
            ConfigFormat::Toml,
        )
        .build()
        .unwrap_err();
    assert!(matches!(
        err,
        FacadeError::ConfigurationInvalid(ConfigError::MissingRequiredOption(ref option))
            if option == "backend_connection_string"
    ));
}

#[test]
fn user_api_requires_start() {
    let lib = CargoLib::builder()
        .lss(Arc::new(MemoryLss::new()))
        .config(CargoConfig::default())
        .build()
        .unwrap();
    assert!(matches!(lib.user_api(), Err(FacadeError::NotInitialized)));
}

#[test]
fn find_containers_by_prefix_and_mount_state() {
    let api = memory_api();
    api.create_identity_from_mnemonic(&api.generate_mnemonic(), "Desk")
        .unwrap();

    let photos = api
        .create_container("photos", &["/a/photos"], None)
        .unwrap();
    api.create_container("backups", &["/b"], None).unwrap();
    api.create_container("music", &["/ab/music"], None).unwrap();
    api.create_container("misc", &["/c", "/a"], None).unwrap();
    api.set_container_mounted(&photos.uuid, true).unwrap();

    let filter =
        ContainerFilter::path_starts_with("/a").or(ContainerFilter::path_starts_with("/b"));
    let names = |state: MountState| -> Vec<String> {
        api.find_containers(Some(&filter), state)
            .unwrap()
            .into_iter()
            .map(|c| c.name)
            .collect()
    };
    assert_eq!(
        names(MountState::MountedOrUnmounted),
        ["backups", "misc", "photos"]
    );
    assert_eq!(names(MountState::Mounted), ["photos"]);
    assert_eq!(names(MountState::Unmounted), ["backups", "misc"]);

    let everything = api
        .find_containers(None, MountState::MountedOrUnmounted)
        .unwrap();
    assert_eq!(everything.len(), 4);
}

#[test]
fn containers_need_an_identity() {
    let api = memory_api();
    assert!(matches!(
        api.create_container("orphan", &["/x"], None).unwrap_err(),
        ContainerError::NoIdentity
    ));
}

#[test]
fn rendered_template_storage_has_no_placeholders() {
    let api = memory_api();
    let pair = api
        .create_identity_from_mnemonic(&api.mnemonic_from_phrase(PHRASE).unwrap(), "My Mac")
        .unwrap();
    let mut template = api.template_from_json(S3_TEMPLATE.as_bytes()).unwrap();
    let template_uuid = api.save_template(&mut template).unwrap();

    let container = api
        .create_container("Books", &["/books", "/papers"], Some(&template_uuid))
        .unwrap();
    let storage = &container.storages[0];
    assert_eq!(storage.template_uuid, Some(template_uuid));
    assert_eq!(storage.backend_type, "s3");

    let rendered = storage.data.to_string();
    assert!(!rendered.contains("{{"));
    assert!(rendered.contains(pair.forest.fingerprint().as_str()));
    assert!(rendered.contains(&container.uuid.to_string()));
    assert_eq!(
        storage.data["label"],
        "Books (ReadWrite) [/books, /papers]"
    );
}

#[test]
fn missing_template_fails_container_creation() {
    let api = memory_api();
    api.create_identity_from_mnemonic(&api.generate_mnemonic(), "Desk")
        .unwrap();
    let err = api
        .create_container("x", &["/x"], Some(&uuid::Uuid::new_v4()))
        .unwrap_err();
    assert!(matches!(err, ContainerError::Template(_)));
    assert!(api
        .find_containers(None, MountState::MountedOrUnmounted)
        .unwrap()
        .is_empty());
}

#[test]
fn yaml_and_json_templates_list_together() {
    let api = memory_api();
    let mut json = api.template_from_json(S3_TEMPLATE.as_bytes()).unwrap();
    let mut yaml = api.template_from_yaml(&json.to_yaml().unwrap()).unwrap();
    yaml.set_name("copy");
    api.save_template(&mut json).unwrap();
    let yaml_uuid = api.save_template(&mut yaml).unwrap();

    let names: Vec<_> = api
        .list_templates()
        .unwrap()
        .into_iter()
        .map(|t| t.name.unwrap_or_default())
        .collect();
    assert_eq!(names, ["copy", "team bucket"]);

    api.remove_template(&yaml_uuid).unwrap();
    assert_eq!(api.list_templates().unwrap().len(), 1);
}

#[test]
fn file_store_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("lss.json");

    let (forest, device, container) = {
        let lib = file_lib(&path);
        let api = lib.user_api().unwrap();
        let pair = api
            .create_identity_from_mnemonic(&api.mnemonic_from_phrase(PHRASE).unwrap(), "My Mac")
            .unwrap();
        api.rename_identity(&pair.device, "Studio Mac").unwrap();
        let container = api.create_container("docs", &["/docs"], None).unwrap();
        api.set_container_mounted(&container.uuid, true).unwrap();
        (
            pair.forest.fingerprint(),
            pair.device.fingerprint(),
            container.uuid,
        )
    };

    let lib = file_lib(&path);
    let api = lib.user_api().unwrap();
    let pair = api.get_current_identity().unwrap().unwrap();
    assert_eq!(pair.forest.fingerprint(), forest);
    assert_eq!(pair.device.fingerprint(), device);
    assert_eq!(pair.device.name(), "Studio Mac");

    let stored = api.get_container(&container).unwrap();
    assert!(stored.mounted);
    let docs = api
        .find_containers(
            Some(&ContainerFilter::has_exact_path("/docs")),
            MountState::Mounted,
        )
        .unwrap();
    assert_eq!(docs.len(), 1);
}

#[test]
fn tampered_identity_record_is_detected() {
    let lss = Arc::new(MemoryLss::new());
    let lib = create_cargo_lib(lss.clone(), CargoConfig::default()).unwrap();
    let api = lib.user_api().unwrap();
    api.create_identity_from_mnemonic(&api.generate_mnemonic(), "Desk")
        .unwrap();

    let key = "cargolib.identity.device";
    let raw = lss.get(key).unwrap().unwrap();
    let tampered = String::from_utf8(raw).unwrap().replace("Desk", "Dusk");
    lss.insert(key, tampered.into_bytes()).unwrap();

    assert!(matches!(
        api.get_current_identity().unwrap_err(),
        IdentityError::StorageFailure(_)
    ));
}

#[test]
fn concurrent_api_clones_do_not_lose_updates() {
    let api = memory_api();
    api.create_identity_from_mnemonic(&api.generate_mnemonic(), "Desk")
        .unwrap();

    let barrier = Arc::new(Barrier::new(4));
    let mut handles = Vec::new();
    for i in 0..4 {
        let api = api.clone();
        let b = Arc::clone(&barrier);
        handles.push(thread::spawn(move || {
            b.wait();
            for j in 0..5 {
                let path = format!("/t{i}/{j}");
                api.create_container(&format!("c-{i}-{j}"), &[path], None)
                    .unwrap();
            }
        }));
    }
    for h in handles {
        h.join().unwrap();
    }

    let all = api
        .find_containers(None, MountState::MountedOrUnmounted)
        .unwrap();
    assert_eq!(all.len(), 20);
    let t2 = api
        .find_containers(
            Some(&ContainerFilter::path_starts_with("/t2")),
            MountState::Unmounted,
        )
        .unwrap();
    assert_eq!(t2.len(), 5);
}

#[test]
fn rename_then_read_is_linearizable_across_clones() {
    let api = memory_api();
    let pair = api
        .create_identity_from_mnemonic(&api.generate_mnemonic(), "start")
        .unwrap();

    let barrier = Arc::new(Barrier::new(2));
    let writer = {
        let api = api.clone();
        let device = pair.device.clone();
        let b = Arc::clone(&barrier);
        thread::spawn(move || {
            b.wait();
            for n in 0..20 {
                api.rename_identity(&device, &format!("name-{n}")).unwrap();
            }
        })
    };
    let reader = {
        let api = api.clone();
        let b = Arc::clone(&barrier);
        thread::spawn(move || {
            b.wait();
            for _ in 0..20 {
                let name = api.get_current_identity().unwrap().unwrap().device.name();
                assert!(name == "start" || name.starts_with("name-"));
            }
        })
    };
    writer.join().unwrap();
    reader.join().unwrap();

    assert_eq!(
        api.get_current_identity().unwrap().unwrap().device.name(),
        "name-19"
    );
}
