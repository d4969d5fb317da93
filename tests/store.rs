use camino::Utf8PathBuf;
use chrono::Utc;
use tempfile::TempDir;

use pesu_sync::domain::{Semester, SemesterList, SessionCredential};
use pesu_sync::store::{FileStore, KeyValueStore, keys, load_record, save_record};

fn temp_store() -> (TempDir, FileStore) {
    let dir = TempDir::new().unwrap();
    let root = Utf8PathBuf::from_path_buf(dir.path().join("cache")).unwrap();
    (dir, FileStore::new(root))
}

#[tokio::test]
async fn records_survive_a_new_store_instance() {
    let (_dir, store) = temp_store();
    let list = SemesterList {
        semesters: vec![Semester {
            value: "901".to_string(),
            label: "Sem-1".to_string(),
            number: 1,
        }],
        fetched_at: Utc::now(),
    };
    save_record(&store, keys::SEMESTERS, &list).await.unwrap();
    assert!(store.root().join("semestersData.json").exists());

    let reopened = FileStore::new(store.root().to_owned());
    let loaded = load_record::<_, SemesterList>(&reopened, keys::SEMESTERS)
        .await
        .unwrap();
    assert_eq!(loaded, Some(list));
}

#[tokio::test]
async fn missing_keys_load_as_none_and_remove_is_idempotent() {
    let (_dir, store) = temp_store();
    assert!(store.load(keys::GPA).await.unwrap().is_none());

    let credential = SessionCredential {
        token: "abc".to_string(),
        obtained_at: Utc::now(),
    };
    save_record(&store, keys::SESSION, &credential).await.unwrap();
    store.remove(keys::SESSION).await.unwrap();
    store.remove(keys::SESSION).await.unwrap();
    assert!(store.load(keys::SESSION).await.unwrap().is_none());
}

#[tokio::test]
async fn saving_replaces_the_whole_value() {
    let (_dir, store) = temp_store();
    store
        .save(keys::PROFILE, serde_json::json!({"name": "A", "srn": "X"}))
        .await
        .unwrap();
    store
        .save(keys::PROFILE, serde_json::json!({"name": "B"}))
        .await
        .unwrap();
    let value = store.load(keys::PROFILE).await.unwrap().unwrap();
    assert_eq!(value, serde_json::json!({"name": "B"}));
}

#[tokio::test]
async fn corrupt_files_are_reported() {
    let (_dir, store) = temp_store();
    std::fs::create_dir_all(store.root()).unwrap();
    std::fs::write(store.root().join("pesuData.json"), b"{not json").unwrap();
    assert!(store.load(keys::TREE).await.is_err());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_saves_of_one_key_all_succeed() {
    let (_dir, store) = temp_store();
    let mut tasks = tokio::task::JoinSet::new();
    for writer in 0..4 {
        let store = store.clone();
        tasks.spawn(async move {
            for round in 0..50 {
                store
                    .save(keys::SESSION, serde_json::json!({"writer": writer, "round": round}))
                    .await?;
            }
            Ok::<_, pesu_sync::error::PesuError>(())
        });
    }
    while let Some(result) = tasks.join_next().await {
        result.unwrap().unwrap();
    }

    let value = store.load(keys::SESSION).await.unwrap().unwrap();
    assert_eq!(value["round"], 49);
    let leftovers = std::fs::read_dir(store.root())
        .unwrap()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_name() != "session.json")
        .count();
    assert_eq!(leftovers, 0);
}
