//! End-to-end scenarios over the driver: linear history, branching,
//! deletion, type conflicts, concurrent starts, and subscriptions.

mod common;

use std::collections::HashSet;
use std::time::Duration;

use common::{commit_file, driver, get, put};
use riverfs_core::{
    CommitRef, CommitType, CoreError, Delimiter, FileRef, ListCommitRequest, Shard,
};
use riverfs_meta::FileType;

#[tokio::test]
async fn test_create_and_inspect_repo() {
    let d = driver();
    d.create_repo("r").await.unwrap();

    let info = d.inspect_repo("r").await.unwrap();
    assert_eq!(info.name, "r");
    assert_eq!(info.size_bytes, 0);

    assert!(matches!(
        d.create_repo("r").await.unwrap_err(),
        CoreError::RepoExists(_)
    ));
    assert!(matches!(
        d.create_repo("bad name").await.unwrap_err(),
        CoreError::InvalidRepoName(_)
    ));
    assert!(matches!(
        d.inspect_repo("missing").await.unwrap_err(),
        CoreError::RepoNotFound(_)
    ));
}

#[tokio::test]
async fn test_list_repo() {
    let d = driver();
    d.create_repo("b").await.unwrap();
    d.create_repo("a").await.unwrap();
    let names: Vec<String> = d
        .list_repo()
        .await
        .unwrap()
        .into_iter()
        .map(|r| r.name)
        .collect();
    assert_eq!(names, vec!["a", "b"]);
}

#[tokio::test]
async fn test_delete_repo_purges_everything() {
    let d = driver();
    d.create_repo("r").await.unwrap();
    d.create_repo("keep").await.unwrap();
    commit_file(&d, "r", "master", "/a/b", b"data").await;
    commit_file(&d, "keep", "master", "/x", b"kept").await;

    d.delete_repo("r").await.unwrap();

    assert!(matches!(
        d.inspect_repo("r").await.unwrap_err(),
        CoreError::RepoNotFound(_)
    ));
    assert!(d.meta().commits.all().iter().all(|c| c.repo == "keep"));
    assert!(d.meta().diffs.all().iter().all(|x| x.repo == "keep"));
    assert!(d.meta().clocks.all().iter().all(|c| c.repo == "keep"));
    // deleting again is a no-op
    d.delete_repo("r").await.unwrap();
}

#[tokio::test]
async fn test_linear_history() {
    let d = driver();
    d.create_repo("r").await.unwrap();
    for i in 0..3u32 {
        commit_file(&d, "r", "master", "/a/b", format!("v{i}").as_bytes()).await;
    }

    assert_eq!(get(&d, "r", "master/2", "/a/b").await, b"v2");
    assert_eq!(get(&d, "r", "master/0", "/a/b").await, b"v0");

    let info = d.inspect_commit("r", "master").await.unwrap();
    assert_eq!(info.size_bytes, 2);
    assert_eq!(info.commit_type, CommitType::Read);
    // the caller's ref is echoed back
    assert_eq!(info.commit_id, "master");
    assert_eq!(info.branch, "master");
}

#[tokio::test]
async fn test_branch_off() {
    let d = driver();
    d.create_repo("r").await.unwrap();
    for i in 0..3u32 {
        commit_file(&d, "r", "master", "/a/b", format!("v{i}").as_bytes()).await;
    }

    let dev = d
        .start_commit("r", Some("master/1"), Some("dev"), Vec::new())
        .await
        .unwrap();
    put(&d, "r", &dev, "/a/b", b"dev0").await;
    d.finish_commit("r", &dev, false).await.unwrap();

    assert_eq!(get(&d, "r", "dev", "/a/b").await, b"dev0");
    assert_eq!(get(&d, "r", "master/2", "/a/b").await, b"v2");

    let branches: HashSet<String> = d
        .list_branch("r")
        .await
        .unwrap()
        .into_iter()
        .map(|c| c.branch)
        .collect();
    assert_eq!(
        branches,
        HashSet::from(["master".to_string(), "dev".to_string()])
    );

    // the branch point is taken: forking "dev" off master/1 again conflicts
    let err = d
        .start_commit("r", Some("master/1"), Some("dev"), Vec::new())
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::BranchExists(b) if b == "dev"));
}

#[tokio::test]
async fn test_delete_file() {
    let d = driver();
    d.create_repo("r").await.unwrap();
    commit_file(&d, "r", "master", "/a/b", b"v0").await;

    let del = d
        .start_commit("r", None, Some("master"), Vec::new())
        .await
        .unwrap();
    d.delete_file(&FileRef::new("r", del.as_str(), "/a"))
        .await
        .unwrap();
    d.finish_commit("r", &del, false).await.unwrap();

    let err = d
        .inspect_file(&FileRef::new("r", "master", "/a/b"), None, None)
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::FileNotFound { .. }));

    let listing = d
        .list_file(&FileRef::new("r", "master", "/"), None, None, false)
        .await
        .unwrap();
    assert!(listing.is_empty());

    // history before the delete is untouched
    assert_eq!(get(&d, "r", "master/0", "/a/b").await, b"v0");
}

#[tokio::test]
async fn test_file_type_conflict() {
    let d = driver();
    d.create_repo("r").await.unwrap();
    let c = d
        .start_commit("r", None, Some("master"), Vec::new())
        .await
        .unwrap();

    put(&d, "r", &c, "/x", b"file").await;
    let mut reader: &[u8] = b"child";
    let err = d
        .put_file(
            &FileRef::new("r", c.as_str(), "/x/y"),
            Delimiter::None,
            &mut reader,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::FileTypeConflict(p) if p == "/x"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_start_commit() {
    let d = driver();
    d.create_repo("r").await.unwrap();

    let mut handles = Vec::new();
    for _ in 0..10 {
        let d = d.clone();
        handles.push(tokio::spawn(async move {
            d.start_commit("r", None, Some("master"), Vec::new())
                .await
                .unwrap()
        }));
    }
    let mut ids = HashSet::new();
    for handle in handles {
        ids.insert(handle.await.unwrap());
    }
    assert_eq!(ids.len(), 10);

    // consecutive clocks, no gaps, no orphans
    let clocks = d.meta().clocks.all();
    let ns: HashSet<u64> = clocks.iter().map(|c| c.n).collect();
    assert_eq!(ns, (0..10).collect::<HashSet<u64>>());
    for clock in &clocks {
        assert!(d.meta().commits.get(&clock.commit_id).is_some());
    }

    let head = d.inspect_commit("r", "master/9").await.unwrap();
    assert_eq!(head.commit_type, CommitType::Write);
}

#[tokio::test]
async fn test_subscribe_commit() {
    let d = driver();
    d.create_repo("r").await.unwrap();
    let _c0 = commit_file(&d, "r", "master", "/f", b"0").await;

    let mut stream = d.subscribe_commit("r", Some("master/0")).await.unwrap();

    let c1 = commit_file(&d, "r", "master", "/f", b"1").await;
    let c2 = commit_file(&d, "r", "master", "/f", b"2").await;

    let first = stream.next().await.unwrap();
    assert_eq!(first.commit_id, c1);
    let resume = stream.position();
    drop(stream);

    // reconnecting from the token resumes exactly after c1
    let mut stream = d.subscribe_commit_at("r", Some(resume));
    let second = stream.next().await.unwrap();
    assert_eq!(second.commit_id, c2);

    // no duplicates, no phantom commits
    let quiet = tokio::time::timeout(Duration::from_millis(50), stream.next()).await;
    assert!(quiet.is_err());
}

#[tokio::test]
async fn test_subscribe_by_alias_matches_reconnect() {
    let d = driver();
    d.create_repo("r").await.unwrap();
    commit_file(&d, "r", "master", "/f", b"0").await;
    let c1 = commit_file(&d, "r", "master", "/f", b"1").await;
    let c2 = commit_file(&d, "r", "master", "/f", b"2").await;

    let mut stream = d.subscribe_commit("r", Some("master/0")).await.unwrap();
    assert_eq!(stream.next().await.unwrap().commit_id, c1);

    let mut stream = d.subscribe_commit("r", Some("master/1")).await.unwrap();
    assert_eq!(stream.next().await.unwrap().commit_id, c2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_finish_commit_waits_for_parent_and_cascades_cancel() {
    let d = driver();
    d.create_repo("r").await.unwrap();
    let parent = d
        .start_commit("r", None, Some("master"), Vec::new())
        .await
        .unwrap();
    let child = d
        .start_commit("r", None, Some("master"), Vec::new())
        .await
        .unwrap();

    let waiter = {
        let d = d.clone();
        let child = child.clone();
        tokio::spawn(async move { d.finish_commit("r", &child, false).await })
    };

    tokio::time::sleep(Duration::from_millis(50)).await;
    let info = d.inspect_commit("r", &child).await.unwrap();
    assert!(info.finished.is_none(), "child must wait for its parent");

    d.finish_commit("r", &parent, true).await.unwrap();
    waiter.await.unwrap().unwrap();

    let info = d.inspect_commit("r", &child).await.unwrap();
    assert!(info.finished.is_some());
    assert!(info.cancelled, "parent cancellation must cascade");
}

#[tokio::test]
async fn test_finish_commit_sizes() {
    let d = driver();
    d.create_repo("r").await.unwrap();
    let c = d
        .start_commit("r", None, Some("master"), Vec::new())
        .await
        .unwrap();
    put(&d, "r", &c, "/one", b"12345").await;
    put(&d, "r", &c, "/two", b"123").await;
    d.finish_commit("r", &c, false).await.unwrap();

    assert_eq!(d.inspect_commit("r", &c).await.unwrap().size_bytes, 8);
    assert_eq!(d.inspect_repo("r").await.unwrap().size_bytes, 8);

    assert!(matches!(
        d.finish_commit("r", &c, false).await.unwrap_err(),
        CoreError::CommitAlreadyFinished { .. }
    ));
}

#[tokio::test]
async fn test_commit_resolution_forms() {
    let d = driver();
    d.create_repo("r").await.unwrap();
    let id = commit_file(&d, "r", "master", "/f", b"x").await;

    for commit_ref in [id.as_str(), "master", "master/0"] {
        assert_eq!(get(&d, "r", commit_ref, "/f").await, b"x");
    }
    assert!(matches!(
        d.inspect_commit("r", "master/7").await.unwrap_err(),
        CoreError::CommitNotFound { .. }
    ));
}

#[tokio::test]
async fn test_list_commit_filters() {
    let d = driver();
    d.create_repo("r").await.unwrap();
    let c0 = commit_file(&d, "r", "master", "/f", b"0").await;
    let c1 = commit_file(&d, "r", "master", "/f", b"1").await;
    let open = d
        .start_commit("r", None, Some("master"), Vec::new())
        .await
        .unwrap();

    let all = d
        .list_commit(ListCommitRequest {
            repos: vec!["r".to_string()],
            ..Default::default()
        })
        .await
        .unwrap();
    // newest first within the branch
    let ids: Vec<String> = all.into_iter().map(|c| c.commit_id).collect();
    assert_eq!(ids, vec![open.clone(), c1.clone(), c0.clone()]);

    let finished = d
        .list_commit(ListCommitRequest {
            repos: vec!["r".to_string()],
            commit_type: Some(CommitType::Read),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(finished.len(), 2);

    let since = d
        .list_commit(ListCommitRequest {
            repos: vec!["r".to_string()],
            from: vec![CommitRef {
                repo: "r".to_string(),
                id: c0.clone(),
            }],
            ..Default::default()
        })
        .await
        .unwrap();
    let ids: Vec<String> = since.into_iter().map(|c| c.commit_id).collect();
    assert_eq!(ids, vec![open, c1]);
}

#[tokio::test]
async fn test_list_commit_cancelled_and_provenance() {
    let d = driver();
    d.create_repo("r").await.unwrap();
    let upstream = commit_file(&d, "r", "master", "/f", b"u").await;

    let cancelled = d
        .start_commit("r", None, Some("master"), Vec::new())
        .await
        .unwrap();
    d.finish_commit("r", &cancelled, true).await.unwrap();

    let derived = d
        .start_commit("r", None, Some("master"), vec![upstream.clone()])
        .await
        .unwrap();
    d.finish_commit("r", &derived, false).await.unwrap();

    let visible = d
        .list_commit(ListCommitRequest {
            repos: vec!["r".to_string()],
            ..Default::default()
        })
        .await
        .unwrap();
    assert!(visible.iter().all(|c| c.commit_id != cancelled));

    let with_cancelled = d
        .list_commit(ListCommitRequest {
            repos: vec!["r".to_string()],
            include_cancelled: true,
            ..Default::default()
        })
        .await
        .unwrap();
    assert!(with_cancelled.iter().any(|c| c.commit_id == cancelled));

    let downstream = d
        .list_commit(ListCommitRequest {
            repos: vec!["r".to_string()],
            provenance: vec![CommitRef {
                repo: "r".to_string(),
                id: upstream,
            }],
            ..Default::default()
        })
        .await
        .unwrap();
    let ids: Vec<String> = downstream.into_iter().map(|c| c.commit_id).collect();
    assert_eq!(ids, vec![derived]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_list_commit_blocks_for_first_match() {
    let d = driver();
    d.create_repo("r").await.unwrap();

    let producer = {
        let d = d.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            commit_file(&d, "r", "master", "/f", b"x").await
        })
    };

    let got = d
        .list_commit(ListCommitRequest {
            repos: vec!["r".to_string()],
            block: true,
            ..Default::default()
        })
        .await
        .unwrap();
    let expected = producer.await.unwrap();
    assert_eq!(got.len(), 1);
    assert_eq!(got[0].commit_id, expected);
}

#[tokio::test]
async fn test_get_file_offset_and_size() {
    let d = driver();
    d.create_repo("r").await.unwrap();
    let data: Vec<u8> = (0..40u8).collect();
    let c = commit_file(&d, "r", "master", "/blob", &data).await;

    let mut reader = d
        .get_file(&FileRef::new("r", c.as_str(), "/blob"), None, 10, Some(20), None)
        .await
        .unwrap();
    assert_eq!(reader.read_to_end().await.unwrap(), &data[10..30]);

    // offset past the end reads nothing
    let mut reader = d
        .get_file(&FileRef::new("r", c.as_str(), "/blob"), None, 100, None, None)
        .await
        .unwrap();
    assert!(reader.read_to_end().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_get_file_on_directory() {
    let d = driver();
    d.create_repo("r").await.unwrap();
    let c = commit_file(&d, "r", "master", "/dir/leaf", b"x").await;

    let err = d
        .get_file(&FileRef::new("r", c.as_str(), "/dir"), None, 0, None, None)
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::NotAFile(_)));
}

#[tokio::test]
async fn test_append_within_commit_overwrite_across() {
    let d = driver();
    d.create_repo("r").await.unwrap();

    let c = d
        .start_commit("r", None, Some("master"), Vec::new())
        .await
        .unwrap();
    put(&d, "r", &c, "/log", b"hello ").await;
    put(&d, "r", &c, "/log", b"world").await;
    d.finish_commit("r", &c, false).await.unwrap();
    assert_eq!(get(&d, "r", "master/0", "/log").await, b"hello world");

    commit_file(&d, "r", "master", "/log", b"fresh").await;
    assert_eq!(get(&d, "r", "master/1", "/log").await, b"fresh");
    assert_eq!(get(&d, "r", "master/0", "/log").await, b"hello world");
}

#[tokio::test]
async fn test_delete_then_put_in_same_commit() {
    let d = driver();
    d.create_repo("r").await.unwrap();
    commit_file(&d, "r", "master", "/a/b", b"old").await;

    let c = d
        .start_commit("r", None, Some("master"), Vec::new())
        .await
        .unwrap();
    d.delete_file(&FileRef::new("r", c.as_str(), "/a"))
        .await
        .unwrap();
    put(&d, "r", &c, "/a/b", b"new").await;
    d.finish_commit("r", &c, false).await.unwrap();

    assert_eq!(get(&d, "r", "master/1", "/a/b").await, b"new");
}

#[tokio::test]
async fn test_put_then_delete_yields_not_found() {
    let d = driver();
    d.create_repo("r").await.unwrap();
    let c = d
        .start_commit("r", None, Some("master"), Vec::new())
        .await
        .unwrap();
    put(&d, "r", &c, "/gone", b"bytes").await;
    d.delete_file(&FileRef::new("r", c.as_str(), "/gone"))
        .await
        .unwrap();
    d.finish_commit("r", &c, false).await.unwrap();

    assert!(matches!(
        d.inspect_file(&FileRef::new("r", "master", "/gone"), None, None)
            .await
            .unwrap_err(),
        CoreError::FileNotFound { .. }
    ));
}

#[tokio::test]
async fn test_list_file_flat_and_recursive() {
    let d = driver();
    d.create_repo("r").await.unwrap();
    let c = d
        .start_commit("r", None, Some("master"), Vec::new())
        .await
        .unwrap();
    put(&d, "r", &c, "/a/b", b"12345").await;
    put(&d, "r", &c, "/a/c", b"123").await;
    put(&d, "r", &c, "/top", b"12").await;
    d.finish_commit("r", &c, false).await.unwrap();

    let root = d
        .list_file(&FileRef::new("r", "master", "/"), None, None, false)
        .await
        .unwrap();
    let entries: Vec<(String, FileType)> = root
        .iter()
        .map(|f| (f.file.path.clone(), f.file_type))
        .collect();
    assert_eq!(
        entries,
        vec![
            ("/a".to_string(), FileType::Dir),
            ("/top".to_string(), FileType::File),
        ]
    );

    let recursive = d
        .list_file(&FileRef::new("r", "master", "/"), None, None, true)
        .await
        .unwrap();
    let sizes: Vec<(String, u64)> = recursive
        .iter()
        .map(|f| (f.file.path.clone(), f.size_bytes))
        .collect();
    // descendant sizes merge into each direct child
    assert_eq!(
        sizes,
        vec![("/a".to_string(), 8), ("/top".to_string(), 2)]
    );

    let leaves = d
        .list_file(&FileRef::new("r", "master", "/a"), None, None, false)
        .await
        .unwrap();
    let paths: Vec<String> = leaves.iter().map(|f| f.file.path.clone()).collect();
    assert_eq!(paths, vec!["/a/b", "/a/c"]);

    // listing a file lists the file itself
    let single = d
        .list_file(&FileRef::new("r", "master", "/top"), None, None, false)
        .await
        .unwrap();
    assert_eq!(single.len(), 1);
    assert_eq!(single[0].file.path, "/top");
}

#[tokio::test]
async fn test_inspect_directory_children() {
    let d = driver();
    d.create_repo("r").await.unwrap();
    let c = d
        .start_commit("r", None, Some("master"), Vec::new())
        .await
        .unwrap();
    put(&d, "r", &c, "/dir/x", b"1").await;
    put(&d, "r", &c, "/dir/y", b"2").await;
    d.finish_commit("r", &c, false).await.unwrap();

    let info = d
        .inspect_file(&FileRef::new("r", "master", "/dir"), None, None)
        .await
        .unwrap();
    assert_eq!(info.file_type, FileType::Dir);
    let children: Vec<String> = info.children.iter().map(|f| f.path.clone()).collect();
    assert_eq!(children, vec!["/dir/x", "/dir/y"]);
}

#[tokio::test]
async fn test_file_shard_filtering() {
    let d = driver();
    d.create_repo("r").await.unwrap();
    let c = commit_file(&d, "r", "master", "/sharded", b"payload").await;

    let modulus = 4;
    let mut seen = 0;
    for n in 0..modulus {
        let shard = Shard {
            file_number: n,
            file_modulus: modulus,
            block_number: 0,
            block_modulus: 0,
        };
        match d
            .inspect_file(&FileRef::new("r", c.as_str(), "/sharded"), Some(&shard), None)
            .await
        {
            Ok(_) => seen += 1,
            Err(CoreError::FileNotFound { .. }) => {}
            Err(other) => panic!("unexpected error: {other}"),
        }
    }
    assert_eq!(seen, 1, "a file belongs to exactly one file shard");
}

#[tokio::test]
async fn test_delimiters_preserve_bytes() {
    let d = driver();
    d.create_repo("r").await.unwrap();

    let payload = b"alpha\nbeta\ngamma\ndelta without newline";
    for (i, delimiter) in [Delimiter::None, Delimiter::Line, Delimiter::Json]
        .into_iter()
        .enumerate()
    {
        let c = d
            .start_commit("r", None, Some("master"), Vec::new())
            .await
            .unwrap();
        let path = format!("/f{i}");
        let mut reader: &[u8] = payload;
        d.put_file(&FileRef::new("r", c.as_str(), path.as_str()), delimiter, &mut reader)
            .await
            .unwrap();
        d.finish_commit("r", &c, false).await.unwrap();
        assert_eq!(get(&d, "r", &c, &path).await, payload);
    }
}

#[tokio::test]
async fn test_put_into_finished_commit_fails() {
    let d = driver();
    d.create_repo("r").await.unwrap();
    let c = commit_file(&d, "r", "master", "/f", b"x").await;

    let mut reader: &[u8] = b"more";
    assert!(matches!(
        d.put_file(&FileRef::new("r", c.as_str(), "/f"), Delimiter::None, &mut reader)
            .await
            .unwrap_err(),
        CoreError::CommitAlreadyFinished { .. }
    ));
    assert!(matches!(
        d.delete_file(&FileRef::new("r", c.as_str(), "/f"))
            .await
            .unwrap_err(),
        CoreError::CommitAlreadyFinished { .. }
    ));
}

#[tokio::test]
async fn test_unsupported_operations() {
    let d = driver();
    d.create_repo("r").await.unwrap();
    assert!(matches!(
        d.delete_commit("r", "master/0").await.unwrap_err(),
        CoreError::Unsupported("DeleteCommit")
    ));
    assert!(matches!(
        d.merge("r", &[]).await.unwrap_err(),
        CoreError::Unsupported("Merge")
    ));
}

#[tokio::test]
async fn test_make_directory_is_accepted() {
    let d = driver();
    d.create_repo("r").await.unwrap();
    let c = d
        .start_commit("r", None, Some("master"), Vec::new())
        .await
        .unwrap();
    d.make_directory(&FileRef::new("r", c.as_str(), "/implicit"))
        .await
        .unwrap();
}
