use kernel_alloc::frame_alloc::{BitmapFrameAlloc, PhysFrameAlloc};
use kernel_alloc::reservation::{ReservationTable, TableState};
use kernel_info::memory::PHYS_LOAD;
use kernel_memory_addresses::{PhysicalAddress, PhysicalRange};

/// 16 MiB starting at physical zero.
type Frames = BitmapFrameAlloc<64>;

const KERNEL_IMAGE_LEN: u64 = 0x20_0000;

fn pa(v: u64) -> PhysicalAddress {
    PhysicalAddress::new(v)
}

#[test]
fn reserved_frames_survive_into_the_general_pool() {
    let mut table = ReservationTable::<16>::new();

    // firmware data, an unaligned ACPI blob and the kernel image
    table.add_range(pa(0), 0x1000);
    table.add_range(pa(0x9_FC00), 0x400);
    table.add_range(pa(PHYS_LOAD), KERNEL_IMAGE_LEN);

    // early page tables come from the top of low memory
    let scratch = table
        .range_search(pa(0), 0x100_0000, 0x8000)
        .expect("room for page tables");
    assert_eq!(scratch, PhysicalRange::new(pa(0xFF_8000), 0x8000).unwrap());
    table.add_range(scratch.base(), scratch.len());

    // a second search must not hand out the same memory again
    let more = table.range_search(pa(0), 0x100_0000, 0x8000).unwrap();
    assert!(!table.overlaps(&more));
    assert_eq!(more.end(), scratch.base().as_u64());

    let mut frames = Frames::new(pa(0));
    let summary = table.wire(&mut frames);
    assert_eq!(table.state(), TableState::Wired);
    assert_eq!(summary.ranges_recorded, 4);
    assert_eq!(summary.ranges_reported, 4);

    let reserved_frames = 1 + 1 + usize::try_from(KERNEL_IMAGE_LEN / 0x1000).unwrap() + 8;
    assert_eq!(frames.free_frames(), frames.total_frames() - reserved_frames);

    let mut handed_out = 0;
    while let Some(frame) = frames.alloc_4k() {
        let bytes = PhysicalRange::new(frame.base(), 0x1000).unwrap();
        assert!(
            !table.overlaps(&bytes),
            "reserved frame {frame} reached the general pool"
        );
        handed_out += 1;
    }
    assert_eq!(handed_out, frames.total_frames() - reserved_frames);
}

#[test]
fn placement_search_is_unaffected_by_wiring() {
    let mut table = ReservationTable::<4>::new();
    table.add_range(pa(PHYS_LOAD), KERNEL_IMAGE_LEN);
    let before = table.range_search(pa(PHYS_LOAD), 0x40_0000, 0x1_0000);

    table.wire(&mut Frames::new(pa(0)));
    let after = table.range_search(pa(PHYS_LOAD), 0x40_0000, 0x1_0000);

    assert_eq!(before, after);
    assert_eq!(after.unwrap().base(), pa(0x4F_0000));
}

#[test]
fn reserved_frames_cannot_be_freed() {
    let mut table = ReservationTable::<4>::new();
    table.add_range(pa(PHYS_LOAD), 0x1000);
    let mut frames = Frames::new(pa(0));
    table.wire(&mut frames);

    let kernel_frame = pa(PHYS_LOAD).page();
    assert!(frames.is_reserved(kernel_frame));
    assert!(frames.free_4k(kernel_frame).is_err());
}
