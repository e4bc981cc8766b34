use std::io::Read;

use btalloc::{Heap, HeapConfig, MemoryProvider, Sbrk};

/// Waits until the user presses ENTER.
/// Useful when you want to inspect memory state with tools like `pmap` or
/// `gdb` while the heap changes.
fn block_until_enter_pressed() {
  println!("\n>>> Press ENTER to continue...");
  let _ = std::io::stdin().bytes().next();
}

/// Prints the program break and every block of the heap.
fn print_heap(
  label: &str,
  heap: &Heap<Sbrk>,
) {
  println!(
    "[{}] PID = {}, heap = {:?}..{:?}, program break = {:?}",
    label,
    std::process::id(),
    heap.provider().heap_lo(),
    heap.provider().heap_hi(),
    Sbrk::program_break(),
  );
  for block in heap.blocks() {
    println!(
      "    {:?} {:>6} bytes {}",
      block.payload,
      block.size,
      if block.allocated { "used" } else { "free" }
    );
  }
}

fn main() {
  let mut heap = match Heap::init(Sbrk::new(), HeapConfig::default()) {
    Ok(heap) => heap,
    Err(err) => {
      eprintln!("cannot initialise the heap: {}", err);
      return;
    }
  };

  print_heap("start", &heap);
  block_until_enter_pressed();

  // --------------------------------------------------------------------
  // 1) Allocate two 32-byte blocks. Each takes 40 bytes: 32 of payload
  //    plus a 4-byte header and a 4-byte footer.
  // --------------------------------------------------------------------
  let a = heap.allocate(32);
  let b = heap.allocate(32);
  println!("\n[1] Allocate A = {:?}, B = {:?}", a, b);
  unsafe { a.write_bytes(0xAB, 32) };
  print_heap("1", &heap);
  block_until_enter_pressed();

  // --------------------------------------------------------------------
  // 2) Release A. Its neighbours are the prologue and B, both in use, so
  //    nothing merges.
  // --------------------------------------------------------------------
  unsafe { heap.release(a) };
  println!("\n[2] Release A");
  print_heap("2", &heap);
  block_until_enter_pressed();

  // --------------------------------------------------------------------
  // 3) Allocate 16 bytes. First fit finds A's hole, splits it and leaves a
  //    16-byte free remainder in front of B.
  // --------------------------------------------------------------------
  let c = heap.allocate(16);
  println!(
    "\n[3] Allocate C = {:?} ({})",
    c,
    if c == a { "reused A" } else { "somewhere else" }
  );
  print_heap("3", &heap);
  block_until_enter_pressed();

  // --------------------------------------------------------------------
  // 4) Allocate 64 KiB, more than the free tail. The heap grows and the
  //    new region merges with the old tail.
  // --------------------------------------------------------------------
  let big = heap.allocate(64 * 1024);
  println!("\n[4] Allocate 64 KiB = {:?}", big);
  print_heap("4", &heap);
  block_until_enter_pressed();

  // --------------------------------------------------------------------
  // 5) Release the large block so B's right neighbour is free again, then
  //    grow B into it without copying.
  // --------------------------------------------------------------------
  unsafe {
    heap.release(big);
    let grown = heap.resize(b, 1024);
    println!(
      "\n[5] Resize B to 1 KiB = {:?} ({})",
      grown,
      if grown == b { "grew in place" } else { "moved" }
    );
  }
  print_heap("5", &heap);

  println!(
    "\n[6] Heap check: {}. End of example; the OS reclaims the break on exit.",
    if heap.check(line!()) { "ok" } else { "FAILED" }
  );
}
