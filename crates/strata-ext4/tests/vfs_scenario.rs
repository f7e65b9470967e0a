//! Full-stack scenarios: ext4 images mounted behind the VFS layer,
//! driven through path lookup and file descriptors.

use std::io::SeekFrom;
use std::sync::Arc;

use strata_block::MemByteDevice;
use strata_error::FsError;
use strata_ext4::Ext4Fs;
use strata_imagegen::{ImageBuilder, ROOT_INO};
use strata_vfs::{NodeKind, OpenFlags, Vfs};

fn mount_at_root(vfs: &Vfs, image: Vec<u8>) -> Arc<Ext4Fs> {
    let fs = Ext4Fs::mount(Arc::new(MemByteDevice::new(image))).expect("mount fs");
    vfs.mount("/", Ext4Fs::root_node(&fs).expect("root node"))
        .expect("mount at /");
    fs
}

#[test]
fn hello_txt_scenario() {
    // A 1024-byte-block image whose root directory (inode 2) holds one
    // file entry "hello.txt" mapped by a single leaf extent to physical
    // block 100 containing "hi".
    let mut builder = ImageBuilder::new(256);
    let info = builder.add_file_at(ROOT_INO, "hello.txt", b"hi", 100);
    assert_eq!(info.first_block, 100);

    let vfs = Vfs::new();
    mount_at_root(&vfs, builder.finish());

    let node = vfs.lookup("/hello.txt").expect("lookup");
    assert_eq!(node.kind, NodeKind::File);
    assert_eq!(node.size, 2, "node size must equal the inode's recorded size");

    let mut buf = [0_u8; 2];
    let n = node.ops.read(0, &mut buf).expect("read");
    assert_eq!(n, 2);
    assert_eq!(&buf, b"hi");
}

#[test]
fn descriptor_read_and_seek_on_ext4_file() {
    let mut builder = ImageBuilder::new(256);
    builder.add_file(ROOT_INO, "data.txt", b"the quick brown fox");

    let vfs = Vfs::new();
    mount_at_root(&vfs, builder.finish());

    let fd = vfs.open("/data.txt", OpenFlags::RDONLY).expect("open");
    let mut buf = [0_u8; 9];
    assert_eq!(vfs.read(fd, &mut buf).expect("read"), 9);
    assert_eq!(&buf, b"the quick");

    vfs.seek(fd, SeekFrom::Start(10)).expect("seek");
    let mut tail = [0_u8; 16];
    assert_eq!(vfs.read(fd, &mut tail).expect("read"), 9);
    assert_eq!(&tail[..9], b"brown fox");

    // EOF: further reads return zero bytes.
    assert_eq!(vfs.read(fd, &mut tail).expect("read"), 0);
    vfs.close(fd).expect("close");
}

#[test]
fn lookup_walks_nested_directories() {
    let mut builder = ImageBuilder::new(256);
    let etc = builder.add_dir(ROOT_INO, "etc");
    let net = builder.add_dir(etc, "net");
    builder.add_file(net, "hosts", b"127.0.0.1 localhost\n");

    let vfs = Vfs::new();
    mount_at_root(&vfs, builder.finish());

    let node = vfs.lookup("/etc/net/hosts").expect("lookup");
    assert_eq!(node.kind, NodeKind::File);

    let mut buf = vec![0_u8; node.size as usize];
    node.ops.read(0, &mut buf).expect("read");
    assert_eq!(buf, b"127.0.0.1 localhost\n");

    // Dot navigation through real ext4 directories.
    assert_eq!(
        vfs.lookup("/etc/net/../net/hosts").expect("lookup").ino,
        node.ino
    );
    assert!(matches!(
        vfs.lookup("/etc/net/hosts/deeper"),
        Err(FsError::NotDirectory)
    ));
    assert!(matches!(vfs.lookup("/etc/missing"), Err(FsError::NotFound(_))));
}

#[test]
fn readdir_via_vfs_matches_directory_contents() {
    let mut builder = ImageBuilder::new(256);
    builder.add_file(ROOT_INO, "a", b"1");
    builder.add_dir(ROOT_INO, "d");

    let vfs = Vfs::new();
    mount_at_root(&vfs, builder.finish());

    let mut names = Vec::new();
    let mut index = 0;
    while let Some(entry) = vfs.readdir("/", index).expect("readdir") {
        names.push((entry.name, entry.kind));
        index += 1;
    }
    assert_eq!(
        names,
        vec![
            (".".to_owned(), NodeKind::Directory),
            ("..".to_owned(), NodeKind::Directory),
            ("a".to_owned(), NodeKind::File),
            ("d".to_owned(), NodeKind::Directory),
        ]
    );
}

#[test]
fn stat_reports_inode_attributes() {
    let mut builder = ImageBuilder::new(256);
    let info = builder.add_file(ROOT_INO, "s.bin", &[0_u8; 3000]);

    let vfs = Vfs::new();
    mount_at_root(&vfs, builder.finish());

    let stat = vfs.stat("/s.bin").expect("stat");
    assert_eq!(stat.ino, u64::from(info.ino));
    assert_eq!(stat.size, 3000);
    assert_eq!(stat.blksize, 1024);
    assert_eq!(stat.nlink, 1);
}

#[test]
fn write_reports_zero_bytes_on_read_only_fs() {
    let mut builder = ImageBuilder::new(256);
    builder.add_file(ROOT_INO, "ro.txt", b"data");

    let vfs = Vfs::new();
    mount_at_root(&vfs, builder.finish());

    let fd = vfs.open("/ro.txt", OpenFlags::RDWR).expect("open");
    assert_eq!(vfs.write(fd, b"overwrite").expect("write"), 0);

    // The file is untouched.
    vfs.seek(fd, SeekFrom::Start(0)).expect("seek");
    let mut buf = [0_u8; 4];
    vfs.read(fd, &mut buf).expect("read");
    assert_eq!(&buf, b"data");
}

#[test]
fn mutating_paths_are_unsupported_on_ext4() {
    let mut builder = ImageBuilder::new(256);
    builder.add_file(ROOT_INO, "f", b"x");

    let vfs = Vfs::new();
    mount_at_root(&vfs, builder.finish());

    assert!(matches!(
        vfs.mkdir("/newdir", 0o755),
        Err(FsError::Unsupported { op: "mkdir" })
    ));
    assert!(matches!(
        vfs.unlink("/f"),
        Err(FsError::Unsupported { op: "unlink" })
    ));
    assert!(matches!(
        vfs.truncate("/f", 0),
        Err(FsError::Unsupported { op: "truncate" })
    ));
}

#[test]
fn readlink_through_vfs() {
    let mut builder = ImageBuilder::new(256);
    builder.add_file(ROOT_INO, "real.txt", b"content");
    builder.add_fast_symlink(ROOT_INO, "alias", "real.txt");

    let vfs = Vfs::new();
    mount_at_root(&vfs, builder.finish());

    let node = vfs.lookup("/alias").expect("lookup");
    assert_eq!(node.kind, NodeKind::Symlink);
    assert_eq!(vfs.readlink("/alias").expect("readlink"), b"real.txt");
}

#[test]
fn second_filesystem_mounts_over_directory() {
    // Outer filesystem with an empty /mnt; inner filesystem with one file.
    let mut outer = ImageBuilder::new(256);
    outer.add_dir(ROOT_INO, "mnt");
    outer.add_file(ROOT_INO, "outer.txt", b"outer");

    let mut inner = ImageBuilder::new(256);
    inner.add_file(ROOT_INO, "inner.txt", b"inner");

    let vfs = Vfs::new();
    mount_at_root(&vfs, outer.finish());
    let inner_fs = Ext4Fs::mount(Arc::new(MemByteDevice::new(inner.finish()))).expect("mount");
    vfs.mount("/mnt", Ext4Fs::root_node(&inner_fs).expect("root"))
        .expect("mount /mnt");

    // Traversal below /mnt lands in the mounted filesystem.
    let node = vfs.lookup("/mnt/inner.txt").expect("lookup");
    let mut buf = vec![0_u8; node.size as usize];
    node.ops.read(0, &mut buf).expect("read");
    assert_eq!(buf, b"inner");

    // The outer tree is still reachable alongside.
    assert!(vfs.lookup("/outer.txt").is_ok());
    assert!(matches!(vfs.lookup("/mnt/outer.txt"), Err(FsError::NotFound(_))));

    // Unmount restores the original (empty) directory.
    vfs.unmount("/mnt").expect("unmount");
    assert!(matches!(vfs.lookup("/mnt/inner.txt"), Err(FsError::NotFound(_))));
    assert_eq!(vfs.lookup("/mnt").expect("lookup").kind, NodeKind::Directory);
}
