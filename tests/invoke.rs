mod common;

use common::{LogFs, format_ops, formatted, setup};
use flashsim::{
    ALL_DEVICES, Access, FileSystem, FsError, Harness, INTERRUPTED, PoolConfig, PoolKind, make_device,
};

#[test]
fn format_counts_every_erase_and_header() {
    let (harness, _flash, areas) = formatted();
    assert_eq!(harness.last_ops(), format_ops(&areas));
}

#[test]
fn written_data_survives_a_remount() {
    let (mut harness, mut flash, areas) = formatted();
    assert_eq!(harness.write_to_file(&mut flash, &areas, "log", b"hello"), 0);
    assert_eq!(harness.write_to_file(&mut flash, &areas, "log", b" world"), 0);

    // A second engine instance sees only what reached the media.
    let mut fresh = Harness::new(LogFs::default(), &PoolConfig::default());
    assert_eq!(fresh.restore(&mut flash, &areas), 0);
    assert_eq!(fresh.engine().contents("log"), Some(&b"hello world"[..]));
}

#[test]
fn rename_moves_the_file() {
    let (mut harness, mut flash, areas) = formatted();
    assert_eq!(harness.write_to_file(&mut flash, &areas, "a.txt", b"x"), 0);
    assert_eq!(harness.rename(&mut flash, &areas, "a.txt", "b.txt"), 0);

    let opened = harness.invoke(&mut flash, &areas, |fs, env| {
        let file = fs.open(env, "b.txt", Access::READ)?;
        fs.close(env, file)
    });
    assert_eq!(opened, Ok(()));

    let missing = harness.invoke(&mut flash, &areas, |fs, env| {
        let file = fs.open(env, "a.txt", Access::READ)?;
        fs.close(env, file)
    });
    assert_eq!(missing, Err(FsError::NotFound("a.txt".to_string())));
}

#[test]
fn engine_errors_come_back_as_codes() {
    let (mut harness, mut flash, areas) = formatted();
    assert_eq!(harness.rename(&mut flash, &areas, "nope", "x"), 6);

    assert_eq!(harness.write_to_file(&mut flash, &areas, "a", b"1"), 0);
    assert_eq!(harness.write_to_file(&mut flash, &areas, "b", b"2"), 0);
    assert_eq!(harness.rename(&mut flash, &areas, "a", "b"), 11);
}

#[test]
fn cut_inside_the_operation_interrupts_it() {
    // Creating a file with ten bytes is an inode record plus a data record.
    for countdown in 1..=2 {
        let (mut harness, mut flash, areas) = formatted();
        harness.arm(countdown);
        assert_eq!(
            harness.write_to_file(&mut flash, &areas, "f", &[7; 10]),
            INTERRUPTED,
            "countdown {countdown}"
        );
        assert_eq!(harness.faults().fired_count(), 1);
    }

    let (mut harness, mut flash, areas) = formatted();
    harness.arm(3);
    assert_eq!(harness.write_to_file(&mut flash, &areas, "f", &[7; 10]), 0);
    assert_eq!(harness.faults().countdown(), 1);
    assert_eq!(harness.faults().fired_count(), 0);
}

#[test]
fn empty_write_to_an_existing_file_is_free() {
    let (mut harness, mut flash, areas) = formatted();
    assert_eq!(harness.write_to_file(&mut flash, &areas, "f", b"x"), 0);

    harness.arm(1);
    assert_eq!(harness.write_to_file(&mut flash, &areas, "f", b""), 0);
    assert_eq!(harness.last_ops(), 0);
    assert_eq!(harness.faults().countdown(), 1);
}

#[test]
fn aborted_calls_leak_slots_until_restore() {
    let (mut harness, mut flash, areas) = formatted();
    harness.arm(2);
    assert_eq!(harness.write_to_file(&mut flash, &areas, "f", &[1; 10]), INTERRUPTED);
    assert_eq!(harness.pools().in_use(PoolKind::File), 1);

    harness.arm(0);
    assert_eq!(harness.restore(&mut flash, &areas), 0);
    assert_eq!(harness.pools().in_use(PoolKind::File), 0);
    assert_eq!(harness.pools().in_use(PoolKind::Inode), 1);
    // The inode record made it, the data record did not.
    assert_eq!(harness.engine().contents("f"), Some(&[][..]));
}

#[test]
fn interrupted_format_does_not_mount() {
    let (mut flash, areas) = make_device(flashsim::DeviceName::Small, 1, 0xff).unwrap();
    let mut harness = Harness::new(LogFs::default(), &PoolConfig::default());
    setup();

    // Erase area 0, write its header, then lose power erasing area 1.
    harness.arm(3);
    assert_eq!(harness.format(&mut flash, &areas), INTERRUPTED);
    harness.arm(0);
    assert_eq!(harness.restore(&mut flash, &areas), 1);
    assert_eq!(harness.format(&mut flash, &areas), 0);
    assert_eq!(harness.restore(&mut flash, &areas), 0);
}

#[test]
fn every_device_geometry_works() {
    setup();
    for &device in ALL_DEVICES {
        for align in [1, 2, 4, 8] {
            for erased in [0xff, 0x00] {
                let (mut flash, areas) = make_device(device, align, erased).unwrap();
                let mut harness = Harness::new(LogFs::default(), &PoolConfig::default());
                let what = format!("{device} align={align} erased={erased:#x}");

                assert_eq!(harness.format(&mut flash, &areas), 0, "{what}");
                assert_eq!(
                    harness.write_to_file(&mut flash, &areas, "data", &[0x5a; 300]),
                    0,
                    "{what}"
                );
                assert_eq!(harness.restore(&mut flash, &areas), 0, "{what}");
                assert_eq!(
                    harness.engine().contents("data"),
                    Some(&[0x5a; 300][..]),
                    "{what}"
                );
            }
        }
    }
}
