use rawpack::archive::{self, PackOptions, UnpackOptions};
use rawpack::codec::{directive::parse, ZSTD_MAGIC};
use rawpack::error::{Error, FormatError};
use rawpack::pipeline::Compression;
use rawpack::signature::{Signature, PREFIX};
use rawpack::table::{FileRecord, FileTable};
use rawpack::tuner::FixedProbe;
use rawpack::walk::{self, Glob, Selection};
use std::fs;
use std::path::Path;
use tempfile::TempDir;

const PROBE: FixedProbe = FixedProbe { memory: 1 << 30, cpus: 2 };

fn populate(files: &[(&str, &[u8])]) -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    for (name, data) in files {
        let path = dir.path().join(name);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, data).unwrap();
    }
    dir
}

fn everything(base: &Path) -> FileTable {
    let sel = Selection { include: vec![Glob::new("*")], ..Selection::default() };
    walk::collect(base, &sel).unwrap()
}

fn pack(base: &Path, password: Option<&str>, compression: Compression) -> Vec<u8> {
    let opts = PackOptions {
        password: password.map(str::to_owned),
        compression,
        ..PackOptions::default()
    };
    let mut wire = Vec::new();
    archive::create(&mut wire, base, &everything(base), &opts, &PROBE).unwrap();
    wire
}

fn unpack_opts(password: Option<&str>, compression: Compression) -> UnpackOptions {
    UnpackOptions {
        password: password.map(str::to_owned),
        compression,
        ..UnpackOptions::default()
    }
}

fn assert_same_tree(files: &[(&str, &[u8])], out: &Path) {
    for (name, data) in files {
        assert_eq!(fs::read(out.join(name)).unwrap(), *data, "{name}");
    }
}

const FILES: &[(&str, &[u8])] = &[
    ("a.txt", b"abc"),
    ("sub/b.txt", b""),
    ("données/日本語.txt", "héllo wörld".as_bytes()),
    ("big.bin", &[7u8; 100_000]),
];

#[test]
fn test_two_file_layout() {
    let src = populate(&[("a.txt", b"abc"), ("sub/b.txt", b"")]);
    let wire = pack(src.path(), None, Compression::Off);

    let mut expected = Vec::new();
    expected.extend_from_slice(&Signature::new().0);
    expected.extend_from_slice(&2u64.to_le_bytes());
    expected.extend_from_slice(&5u64.to_le_bytes());
    expected.extend_from_slice(b"a.txt");
    expected.extend_from_slice(&3u64.to_le_bytes());
    expected.extend_from_slice(&9u64.to_le_bytes());
    expected.extend_from_slice(b"sub/b.txt");
    expected.extend_from_slice(&0u64.to_le_bytes());
    expected.extend_from_slice(b"abc");
    assert_eq!(wire, expected);
    assert_eq!(&wire[..15], PREFIX);

    let out = tempfile::tempdir().unwrap();
    let table = archive::extract(&wire[..], out.path(), &unpack_opts(None, Compression::Off), &PROBE).unwrap();
    assert_eq!(table.len(), 2);
    assert_eq!(fs::read(out.path().join("a.txt")).unwrap(), b"abc");
    assert!(out.path().join("sub").is_dir());
    assert_eq!(fs::read(out.path().join("sub/b.txt")).unwrap(), b"");
}

#[test]
fn test_roundtrip_every_layer_combination() {
    let src = populate(FILES);
    let zstd = || Compression::Zstd(parse("l=low,m=1M").unwrap());
    let combos: [(Option<&str>, Compression); 4] = [
        (None, Compression::Off),
        (None, zstd()),
        (Some("secret"), Compression::Off),
        (Some("secret"), zstd()),
    ];
    for (password, compression) in combos {
        let wire = pack(src.path(), password, compression);
        let out = tempfile::tempdir().unwrap();
        archive::extract(&wire[..], out.path(), &unpack_opts(password, compression), &PROBE).unwrap();
        assert_same_tree(FILES, out.path());
    }
}

#[test]
fn test_detect_compression_on_extract() {
    let src = populate(FILES);
    for compression in [Compression::Off, Compression::Zstd(parse("m=1M").unwrap())] {
        let wire = pack(src.path(), Some("pw"), compression);
        let out = tempfile::tempdir().unwrap();
        archive::extract(&wire[..], out.path(), &unpack_opts(Some("pw"), Compression::Detect), &PROBE).unwrap();
        assert_same_tree(FILES, out.path());
    }
}

#[test]
fn test_auto_directive_roundtrip() {
    // A small machine keeps the auto window modest.
    let small = FixedProbe { memory: 64 << 20, cpus: 1 };
    let src = populate(FILES);
    let opts = PackOptions {
        compression: Compression::Zstd(parse("auto").unwrap()),
        ..PackOptions::default()
    };
    let mut wire = Vec::new();
    archive::create(&mut wire, src.path(), &everything(src.path()), &opts, &small).unwrap();
    assert_eq!(&wire[..4], &ZSTD_MAGIC);
    let out = tempfile::tempdir().unwrap();
    archive::extract(&wire[..], out.path(), &unpack_opts(None, Compression::Detect), &small).unwrap();
    assert_same_tree(FILES, out.path());
}

#[test]
fn test_auto_archive_from_big_machine_opens_on_small_one() {
    let big = FixedProbe { memory: 16 << 30, cpus: 4 };
    let small = FixedProbe { memory: 128 << 20, cpus: 1 };
    let src = populate(&[("a.txt", b"abc")]);
    let opts = PackOptions {
        compression: Compression::Zstd(parse("auto").unwrap()),
        ..PackOptions::default()
    };
    let mut wire = Vec::new();
    archive::create(&mut wire, src.path(), &everything(src.path()), &opts, &big).unwrap();
    assert_eq!(&wire[..4], &ZSTD_MAGIC);

    let table = archive::list(&wire[..], &UnpackOptions::default(), &small).unwrap();
    assert_eq!(table.len(), 1);
    let out = tempfile::tempdir().unwrap();
    archive::extract(&wire[..], out.path(), &UnpackOptions::default(), &small).unwrap();
    assert_eq!(fs::read(out.path().join("a.txt")).unwrap(), b"abc");
}

#[test]
fn test_compression_shrinks_repetitive_payload() {
    let src = populate(&[("big.bin", &[7u8; 100_000])]);
    let plain = pack(src.path(), None, Compression::Off);
    let packed = pack(src.path(), None, Compression::Zstd(parse("l=high,m=1M").unwrap()));
    assert!(packed.len() * 10 < plain.len());
}

#[test]
fn test_wrong_password_fails_signature() {
    let src = populate(&[("a.txt", b"abc")]);
    let wire = pack(src.path(), Some("right"), Compression::Off);
    let out = tempfile::tempdir().unwrap();
    let err = archive::extract(&wire[..], out.path(), &unpack_opts(Some("wrong"), Compression::Off), &PROBE)
        .unwrap_err();
    assert!(matches!(err, Error::Format(FormatError::InvalidSignature { .. })), "{err}");
    assert_eq!(fs::read_dir(out.path()).unwrap().count(), 0);

    // Missing password is just as wrong.
    let err = archive::list(&wire[..], &unpack_opts(None, Compression::Off), &PROBE).unwrap_err();
    assert!(matches!(err, Error::Format(FormatError::InvalidSignature { .. })));
}

#[test]
fn test_list_reads_table_only() {
    let src = populate(FILES);
    let wire = pack(src.path(), None, Compression::Off);
    let table = archive::list(&wire[..], &UnpackOptions::default(), &PROBE).unwrap();
    let names: Vec<&str> = table.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, ["a.txt", "big.bin", "données/日本語.txt", "sub/b.txt"]);
    assert_eq!(table.payload_size(), 3 + 100_000 + "héllo wörld".len() as u64);
}

#[test]
fn test_empty_archive() {
    let src = tempfile::tempdir().unwrap();
    let wire = pack(src.path(), None, Compression::Off);
    assert_eq!(wire.len(), 16 + 8);
    let table = archive::list(&wire[..], &UnpackOptions::default(), &PROBE).unwrap();
    assert!(table.is_empty());
}

#[test]
fn test_foreign_stream_rejected() {
    let out = tempfile::tempdir().unwrap();
    let err = archive::extract(&b"definitely not an archive"[..], out.path(), &UnpackOptions::default(), &PROBE)
        .unwrap_err();
    assert!(matches!(err, Error::Format(FormatError::InvalidSignature { .. })));

    let err = archive::list(&b"ab"[..], &UnpackOptions::default(), &PROBE).unwrap_err();
    assert!(matches!(err, Error::Format(FormatError::Undetectable { got: 2 })));
}

#[test]
fn test_truncated_table() {
    let src = populate(&[("a.txt", b"abc")]);
    let wire = pack(src.path(), None, Compression::Off);
    // Cut inside the first name.
    let err = archive::list(&wire[..16 + 8 + 8 + 2], &UnpackOptions::default(), &PROBE).unwrap_err();
    assert!(matches!(err, Error::Format(FormatError::UnexpectedEof { .. })), "{err}");
}

#[test]
fn test_extract_into_missing_nested_dir() {
    let src = populate(&[("x/y/z.txt", b"deep")]);
    let wire = pack(src.path(), None, Compression::Off);
    let out = tempfile::tempdir().unwrap();
    let base = out.path().join("new/base");
    archive::extract(&wire[..], &base, &UnpackOptions::default(), &PROBE).unwrap();
    assert_eq!(fs::read(base.join("x/y/z.txt")).unwrap(), b"deep");
}

#[test]
fn test_extract_base_is_a_file() {
    let src = populate(&[("a.txt", b"abc")]);
    let wire = pack(src.path(), None, Compression::Off);
    let out = tempfile::tempdir().unwrap();
    let base = out.path().join("file");
    fs::write(&base, b"").unwrap();
    let err = archive::extract(&wire[..], &base, &UnpackOptions::default(), &PROBE).unwrap_err();
    assert!(matches!(err, Error::NotADirectory { .. }));
}

#[test]
fn test_hand_built_table_packs_in_order() {
    let src = populate(&[("b", b"2"), ("a", b"1")]);
    let table: FileTable = vec![FileRecord::new("b", 1), FileRecord::new("a", 1)].into_iter().collect();
    let mut wire = Vec::new();
    archive::create(&mut wire, src.path(), &table, &PackOptions::default(), &PROBE).unwrap();
    assert_eq!(&wire[wire.len() - 2..], b"21");
}
