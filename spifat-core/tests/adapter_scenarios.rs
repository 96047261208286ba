//! End-to-end scenarios driving the adapter against an in-memory card.

use spifat_core::{
    Errno, EntryCollector, FatError, MemoryCard, OpenFlags, SpiFatFs,
};

fn adapter() -> SpiFatFs<MemoryCard> {
    SpiFatFs::new(MemoryCard::new())
}

/// List a directory completely in one call, with attributes.
fn list_all(fs: &SpiFatFs<MemoryCard>, path: &str) -> Vec<String> {
    let fh = fs.opendir(path).expect("opendir");
    let mut collector = EntryCollector::new();
    fs.readdir(fh, 0, true, &mut collector).expect("readdir");
    fs.releasedir(fh).expect("releasedir");
    collector
        .names()
        .into_iter()
        .map(str::to_string)
        .collect()
}

#[test]
fn test_empty_volume_root_attributes() {
    let fs = adapter();

    let root = fs.getattr("/").expect("root attr");
    assert!(root.is_dir());
    assert_eq!(root.nlink, 2);

    // The empty root lists only the synthetic entries.
    assert_eq!(list_all(&fs, "/"), [".", ".."]);
}

#[test]
fn test_create_write_release_open_read() {
    let fs = adapter();
    let payload = b"It works!\r\n";

    let fh = fs.create("/a.txt").expect("create");
    assert_eq!(fs.write(fh, 0, payload).expect("write"), payload.len());
    fs.release(fh).expect("release");

    let fh = fs.open("/a.txt", OpenFlags::empty()).expect("open");
    let mut buf = [0u8; 64];
    let n = fs.read(fh, 0, &mut buf).expect("read");
    assert_eq!(n, payload.len());
    assert_eq!(&buf[..n], payload);
    fs.release(fh).expect("release");

    let attr = fs.getattr("/a.txt").expect("getattr");
    assert_eq!(attr.size, payload.len() as u64);
    assert!(!attr.is_dir());
}

#[test]
fn test_open_missing_path_is_not_found() {
    let fs = adapter();
    assert_eq!(
        fs.open("/missing", OpenFlags::empty()).unwrap_err(),
        Errno::ENOENT
    );
}

#[test]
fn test_hidden_file_round_trip() {
    let fs = adapter();

    let fh = fs.create("/.hidden").expect("create hidden");
    fs.write(fh, 0, b"secret").expect("write");
    fs.release(fh).expect("release");

    // Stored mangled, presented hidden.
    assert!(fs.card().exists("/_hidden"));
    assert!(!fs.card().exists("/.hidden"));
    assert_eq!(list_all(&fs, "/"), [".", "..", ".hidden"]);

    // getattr and open translate the path back outbound.
    let attr = fs.getattr("/.hidden").expect("getattr hidden");
    assert_eq!(attr.size, 6);
    let fh = fs.open("/.hidden", OpenFlags::empty()).expect("open hidden");
    let mut buf = [0u8; 16];
    assert_eq!(fs.read(fh, 0, &mut buf).expect("read"), 6);
    fs.release(fh).expect("release");
}

#[test]
fn test_readdir_paging_with_bounded_buffer() {
    let fs = adapter();
    for name in ["a", "b", "c", "d", "e"] {
        fs.card()
            .seed_file(&format!("/{name}"), b"x".to_vec())
            .expect("seed");
    }

    let fh = fs.opendir("/").expect("opendir");

    // First call: the reply buffer only takes four entries
    // ("." ".." "a" "b").
    let mut first = EntryCollector::with_capacity(4);
    fs.readdir(fh, 0, true, &mut first).expect("readdir");
    assert_eq!(first.names(), [".", "..", "a", "b"]);

    // Second call resumes from the echoed cookie and yields exactly the
    // rest, no duplicates, no omissions.
    let mut second = EntryCollector::new();
    fs.readdir(fh, first.next_offset(), true, &mut second)
        .expect("readdir continuation");
    assert_eq!(second.names(), ["c", "d", "e"]);

    fs.releasedir(fh).expect("releasedir");
}

#[test]
fn test_card_ejection_invalidates_and_remounts() {
    let fs = adapter();
    fs.card().seed_file("/f", b"data".to_vec()).expect("seed");
    assert!(fs.getattr("/f").is_ok());
    assert!(fs.is_mounted());

    fs.card().eject();
    let err = fs.opendir("/").unwrap_err();
    assert_eq!(err, Errno::EINTR);
    assert!(!fs.is_mounted(), "disk fault must invalidate the mount");

    // Reinsert: the next operation mounts fresh and succeeds.
    fs.card().insert();
    assert!(fs.getattr("/f").is_ok());
    assert!(fs.is_mounted());
}

#[test]
fn test_readdir_disk_fault_invalidates_mount() {
    let fs = adapter();
    fs.card().seed_file("/f", b"x".to_vec()).expect("seed");

    let fh = fs.opendir("/").expect("opendir");
    fs.card().fail_next(FatError::DiskError);

    let mut collector = EntryCollector::new();
    let err = fs.readdir(fh, 0, false, &mut collector).unwrap_err();
    assert_eq!(err, Errno::EINTR);
    assert!(!fs.is_mounted());
}

#[test]
fn test_getattr_retry_recovers_from_transient_fault() {
    let fs = adapter();
    fs.card().seed_file("/f", b"data".to_vec()).expect("seed");
    fs.getattr("/f").expect("prime the mount");

    // One transient fault: the bounded retry remounts and succeeds.
    fs.card().fail_next(FatError::NotReady);
    let attr = fs.getattr("/f").expect("retry should recover");
    assert_eq!(attr.size, 4);
}

#[test]
fn test_flush_on_stale_handle_after_ejection() {
    let fs = adapter();
    let fh = fs.create("/f").expect("create");
    fs.write(fh, 0, b"abc").expect("write");

    fs.card().eject();
    fs.card().insert();

    // The handle predates the reinsertion; the remounted volume cannot
    // serve it.
    assert_eq!(fs.flush(fh).unwrap_err(), Errno::EINTR);
    fs.release(fh).ok();
}

#[test]
fn test_mkdir_rmdir_lifecycle() {
    let fs = adapter();

    fs.mkdir("/docs").expect("mkdir");
    assert!(fs.getattr("/docs").expect("getattr").is_dir());

    // mkdir again collides.
    assert_eq!(fs.mkdir("/docs").unwrap_err(), Errno::EACCES);

    fs.card()
        .seed_file("/docs/keep", b"x".to_vec())
        .expect("seed");
    assert_eq!(fs.rmdir("/docs").unwrap_err(), Errno::EACCES);

    fs.unlink("/docs/keep").expect("unlink");
    fs.rmdir("/docs").expect("rmdir");
    assert_eq!(fs.getattr("/docs").unwrap_err(), Errno::ENOENT);
}

fn next_random(state: &mut u64) -> u64 {
    *state ^= *state << 13;
    *state ^= *state >> 7;
    *state ^= *state << 17;
    *state
}

/// The stress cycle: create files of pseudo-random data, rescan and
/// verify names, sizes and checksums over several iterations, remove
/// everything.
#[test]
fn test_stress_cycle() {
    const NFILES: usize = 8;
    const FILE_SIZE: usize = 256;

    let fs = adapter();
    fs.mkdir("/STRESSSD").expect("mkdir");

    let mut seed = 0x9E37_79B9_7F4A_7C15u64;
    let mut expected: Vec<(String, u64)> = Vec::new();

    for i in 0..NFILES {
        let name = format!("{i:04}.DAT");
        let data: Vec<u8> = (0..FILE_SIZE)
            .map(|_| (next_random(&mut seed) & 0xff) as u8)
            .collect();
        let checksum: u64 = data.iter().map(|&b| u64::from(b)).sum();

        let fh = fs.create(&format!("/STRESSSD/{name}")).expect("create");
        assert_eq!(fs.write(fh, 0, &data).expect("write"), FILE_SIZE);
        fs.release(fh).expect("release");

        expected.push((name, checksum));
    }

    for _ in 0..3 {
        let names = {
            let listing = list_all(&fs, "/STRESSSD");
            listing[2..].to_vec() // skip "." and ".."
        };
        assert_eq!(names.len(), NFILES);

        for (name, checksum) in &expected {
            assert!(names.contains(name), "missing {name}");

            let path = format!("/STRESSSD/{name}");
            let attr = fs.getattr(&path).expect("getattr");
            assert_eq!(attr.size, FILE_SIZE as u64);

            let fh = fs.open(&path, OpenFlags::empty()).expect("open");
            let mut data = vec![0u8; FILE_SIZE];
            assert_eq!(fs.read(fh, 0, &mut data).expect("read"), FILE_SIZE);
            fs.release(fh).expect("release");

            let sum: u64 = data.iter().map(|&b| u64::from(b)).sum();
            assert_eq!(sum, *checksum, "checksum mismatch for {name}");
        }
    }

    for (name, _) in &expected {
        fs.unlink(&format!("/STRESSSD/{name}")).expect("unlink");
    }
    fs.rmdir("/STRESSSD").expect("rmdir");
    assert_eq!(fs.getattr("/STRESSSD").unwrap_err(), Errno::ENOENT);
}

#[test]
fn test_listing_times_follow_card_clock() {
    use spifat_core::{timestamp, CalendarTime};

    let created_at = CalendarTime {
        year: 2023,
        month: 8,
        day: 15,
        hour: 10,
        minute: 40,
        second: 20,
    };

    let fs = adapter();
    fs.card().set_fattime(timestamp::encode(&created_at));

    let fh = fs.create("/stamped").expect("create");
    fs.write(fh, 0, b"x").expect("write");
    fs.release(fh).expect("release");

    let dh = fs.opendir("/").expect("opendir");
    let mut collector = EntryCollector::new();
    fs.readdir(dh, 0, true, &mut collector).expect("readdir");
    fs.releasedir(dh).expect("releasedir");

    let attr = collector
        .entries()
        .iter()
        .find(|(name, _)| name == "stamped")
        .and_then(|(_, attr)| *attr)
        .expect("listed with attributes");
    assert_eq!(attr.mtime, created_at.unix_seconds());
}

#[test]
fn test_short_read_at_end_of_file() {
    let fs = adapter();
    fs.card().seed_file("/s", b"12345".to_vec()).expect("seed");

    let fh = fs.open("/s", OpenFlags::empty()).expect("open");
    let mut buf = [0u8; 3];
    assert_eq!(fs.read(fh, 4, &mut buf).expect("read"), 1);
    assert_eq!(buf[0], b'5');
    assert_eq!(fs.read(fh, 5, &mut buf).expect("read at eof"), 0);
    fs.release(fh).expect("release");
}

#[test]
fn test_sparse_write_zero_fills_gap() {
    let fs = adapter();
    let fh = fs.create("/gap").expect("create");
    fs.write(fh, 4, b"end").expect("write past eof");
    fs.release(fh).expect("release");

    assert_eq!(
        fs.card().file_contents("/gap"),
        Some(b"\0\0\0\0end".to_vec())
    );
}
