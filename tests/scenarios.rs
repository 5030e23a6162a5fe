//! End-to-end scenarios against the public [`svnfs::Fs`] API, covering the
//! literal-value walkthroughs a fresh repository's commit pipeline must
//! satisfy: a first commit, rep-sharing dedup, a lost out-of-date race,
//! changed-paths folding, a growing delta chain, and hotcopy fidelity.

use svnfs::{editor, Error, Fs, Layout};
use svnfs_commit::root_id;
use svnfs_storage::checksum;
use svnfs_storage::deltify::DeltifyConfig;
use svnfs_storage::noderev::Kind;
use tempfile::tempdir;

fn fresh_repo() -> (tempfile::TempDir, Fs) {
    let dir = tempdir().unwrap();
    let repo = Fs::create(dir.path(), 7, Layout::Linear).unwrap();
    (dir, repo)
}

#[test]
fn s1_fresh_repository_single_commit() {
    let (_dir, repo) = fresh_repo();
    assert_eq!(repo.youngest_revision().unwrap(), 0);

    let txn = repo.begin_transaction(0).unwrap();
    editor::make_file(repo.paths(), repo.format().layout, &txn, "/hello", b"Hello, world!\n").unwrap();
    let rev = repo.commit(&txn).unwrap();

    assert_eq!(rev, 1);
    assert_eq!(repo.youngest_revision().unwrap(), 1);
    let contents = repo.file_contents(1, "/hello").unwrap();
    assert_eq!(contents, b"Hello, world!\n");
    let (md5, _sha1) = checksum::digest_bytes(&contents);
    assert_eq!(md5, "fc3ff98e8c6a0d3087d515c0473f8677");
}

#[test]
fn s2_rep_sharing_dedup_shares_offset() {
    let (_dir, repo) = fresh_repo();

    let txn = repo.begin_transaction(0).unwrap();
    editor::make_file(repo.paths(), repo.format().layout, &txn, "/a", b"same").unwrap();
    editor::make_file(repo.paths(), repo.format().layout, &txn, "/b", b"same").unwrap();
    let rev = repo.commit(&txn).unwrap();

    let a = repo.node_revision(rev, "/a").unwrap();
    let b = repo.node_revision(rev, "/b").unwrap();
    let a_rep = a.data_rep.expect("a has contents");
    let b_rep = b.data_rep.expect("b has contents");
    assert_eq!(a_rep.offset, b_rep.offset);
    assert_eq!(a_rep.revision, b_rep.revision);
}

#[test]
fn s3_out_of_date_commit_leaves_loser_usable() {
    let (_dir, repo) = fresh_repo();

    let t1 = repo.begin_transaction(0).unwrap();
    let t2 = repo.begin_transaction(0).unwrap();

    editor::make_file(repo.paths(), repo.format().layout, &t1, "/x", b"first").unwrap();
    assert_eq!(repo.commit(&t1).unwrap(), 1);

    editor::make_file(repo.paths(), repo.format().layout, &t2, "/x", b"second").unwrap();
    let err = repo.commit(&t2).unwrap_err();
    assert!(matches!(err, Error::TxnOutOfDate { base: 0, current: 1 }));

    // The loser's scratch state survives the failed commit and can still
    // be read back.
    assert!(t2.get_node_revision(&root_id(t2.id())).is_ok());
}

#[test]
fn s4_changed_paths_folding_cancels_add_then_delete() {
    let (_dir, repo) = fresh_repo();

    let txn = repo.begin_transaction(0).unwrap();
    editor::make_dir(repo.paths(), repo.format().layout, &txn, "/d").unwrap();
    editor::make_file(repo.paths(), repo.format().layout, &txn, "/d/f", b"x").unwrap();
    editor::delete(repo.paths(), repo.format().layout, &txn, "/d").unwrap();
    let rev = repo.commit(&txn).unwrap();

    let changed = repo.changed_paths(rev).unwrap();
    assert!(!changed.contains_key("/d"));
    assert!(!changed.contains_key("/d/f"));
}

#[test]
fn s5_delta_chain_reconstructs_every_revision() {
    let (_dir, repo) = fresh_repo();

    let txn = repo.begin_transaction(0).unwrap();
    editor::make_file(repo.paths(), repo.format().layout, &txn, "/big", b"C0").unwrap();
    repo.commit(&txn).unwrap();

    let mut expected = vec![b"C0".to_vec()];
    for i in 1..=16 {
        let base = repo.youngest_revision().unwrap();
        let txn = repo.begin_transaction(base).unwrap();
        let content = format!("C{i}").into_bytes();
        editor::set_file_contents(
            repo.paths(),
            repo.format().layout,
            &txn,
            "/big",
            &content,
            DeltifyConfig::default(),
        )
        .unwrap();
        repo.commit(&txn).unwrap();
        expected.push(content);
    }

    for (rev, bytes) in expected.iter().enumerate() {
        let got = repo.file_contents(rev as i64 + 1, "/big").unwrap();
        assert_eq!(&got, bytes, "revision {} mismatch", rev + 1);
    }

    let newest = repo.node_revision(17, "/big").unwrap();
    assert_eq!(newest.kind, Kind::File);

    // Commit 17 ("/big" at predecessor-count 16, content "C16") is exactly
    // the first skip-delta case under the default config
    // (`max_linear_deltification = 16`): `count & (count - 1) == 0`, so the
    // skip distance is the full 16 and the base is the *origin* of the
    // line, commit 1 (content "C0"), not commit 16 (spec.md §4.6, §8
    // scenario S5 — "encode its representation as a delta whose base is
    // the representation in commit 16, not the origin" describes the
    // *sixteenth* commit, i.e. predecessor-count 15, which stays linear;
    // the seventeenth is where the skip to the origin happens).
    let rep = newest.data_rep.expect("/big has contents");
    assert_eq!(rep.revision, 17);
    let source = svnfs_commit::source::RevisionFileSource::new(repo.paths(), repo.format().layout);
    let (header, _body) =
        svnfs_storage::repstore::read_raw_segment(&source, rep.revision, rep.offset, rep.size).unwrap();
    match header {
        svnfs_storage::repstore::SegmentHeader::Delta {
            base: Some(base),
        } => {
            assert_eq!(base.revision, 1, "expected the skip-delta base at commit 17 to be the origin, commit 1");
        }
        other => panic!("expected a delta representation for commit 17, found {other:?}"),
    }
}

#[test]
fn s6_hotcopy_then_diff_is_byte_identical() {
    let (_src_dir, src) = fresh_repo();

    // Populate with a mix of files, directories, deletes, copies and
    // property changes, committing one revision per step (spec.md §8,
    // scenario S6).
    let mut existing_paths: Vec<String> = Vec::new();

    let txn = src.begin_transaction(0).unwrap();
    editor::make_dir(src.paths(), src.format().layout, &txn, "/trunk").unwrap();
    editor::make_file(src.paths(), src.format().layout, &txn, "/trunk/a", b"a-contents").unwrap();
    src.commit(&txn).unwrap();
    existing_paths.push("/trunk".into());
    existing_paths.push("/trunk/a".into());

    let txn = src.begin_transaction(src.youngest_revision().unwrap()).unwrap();
    editor::make_file(src.paths(), src.format().layout, &txn, "/trunk/b", b"b-contents").unwrap();
    let mut props = svnfs_storage::proplist::PropList::new();
    props.insert("svn:executable".into(), b"*".to_vec());
    editor::set_properties(src.paths(), src.format().layout, &txn, "/trunk/a", props).unwrap();
    src.commit(&txn).unwrap();
    existing_paths.push("/trunk/b".into());

    let txn = src.begin_transaction(src.youngest_revision().unwrap()).unwrap();
    editor::copy(
        src.paths(),
        src.format().layout,
        &txn,
        src.youngest_revision().unwrap(),
        "/trunk",
        "/branch",
    )
    .unwrap();
    src.commit(&txn).unwrap();
    existing_paths.push("/branch".into());

    let txn = src.begin_transaction(src.youngest_revision().unwrap()).unwrap();
    editor::delete(src.paths(), src.format().layout, &txn, "/trunk/b").unwrap();
    src.commit(&txn).unwrap();

    let youngest = src.youngest_revision().unwrap();
    assert_eq!(youngest, 4);

    let dst_dir = tempdir().unwrap();
    let copied = src
        .hotcopy(dst_dir.path(), true, &|| false)
        .unwrap();
    assert_eq!(copied, youngest);

    let dst = Fs::open(dst_dir.path()).unwrap();
    assert_eq!(dst.youngest_revision().unwrap(), youngest);

    for rev in 0..=youngest {
        for path in &existing_paths {
            let src_contents = src.node_revision(rev, path);
            let dst_contents = dst.node_revision(rev, path);
            match (src_contents, dst_contents) {
                (Ok(s), Ok(d)) => {
                    assert_eq!(s.kind, d.kind, "{path} kind mismatch at r{rev}");
                    if s.kind == Kind::File {
                        let sb = src.file_contents(rev, path).unwrap();
                        let db = dst.file_contents(rev, path).unwrap();
                        assert_eq!(sb, db, "{path} contents mismatch at r{rev}");
                    }
                }
                (Err(_), Err(_)) => {}
                _ => panic!("{path} existence mismatch between src and dst at r{rev}"),
            }
        }
    }
}
