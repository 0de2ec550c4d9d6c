use std::{env, io::Read};

use tagalloc::{Allocator, Config, SearchMode};
use tracing_subscriber::EnvFilter;

/// Waits until the user presses ENTER, unless `--no-wait` was given.
fn block_until_enter_pressed(wait: bool) {
  if !wait {
    return;
  }
  println!("\n>>> Press ENTER to continue...");
  let _ = std::io::stdin().bytes().next();
}

fn search_mode(name: Option<&str>) -> SearchMode {
  match name {
    Some("best") => SearchMode::BestFit,
    Some("worst") => SearchMode::WorstFit,
    _ => SearchMode::FirstFit,
  }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
  // RUST_LOG=tagalloc=debug shows every split and merge.
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::from_default_env())
    .init();

  let args: Vec<String> = env::args().skip(1).collect();
  let wait = !args.iter().any(|arg| arg == "--no-wait");
  let mode = search_mode(args.iter().find(|arg| !arg.starts_with("--")).map(String::as_str));

  let mut allocator = Allocator::new(Config::new(mode))?;
  println!("Search mode: {mode:?}");
  println!("{allocator}");

  // --------------------------------------------------------------------
  // 1) Three allocations. 600 rounds to 608, 30 and 25 both round to 32.
  // --------------------------------------------------------------------
  let a1 = allocator.allocate(600)?;
  let a2 = allocator.allocate(30)?;
  let a3 = allocator.allocate(25)?;

  unsafe {
    a1.as_ptr().write_bytes(0xAB, 600);
    a2.as_ptr().write_bytes(0xCD, 30);
    a3.as_ptr().write_bytes(0xEF, 25);
  }

  println!("\n[1] Allocated 600, 30 and 25 bytes");
  println!("{allocator}");
  block_until_enter_pressed(wait);

  // --------------------------------------------------------------------
  // 2) Release the middle block. Both neighbours are in use, nothing merges.
  // --------------------------------------------------------------------
  allocator.release(a2.as_ptr())?;
  println!("\n[2] Released the 30-byte block");
  println!("{allocator}");
  block_until_enter_pressed(wait);

  // --------------------------------------------------------------------
  // 3) Release the first block. It absorbs the free block to its right.
  // --------------------------------------------------------------------
  allocator.release(a1.as_ptr())?;
  println!("\n[3] Released the 600-byte block");
  println!("{allocator}");
  block_until_enter_pressed(wait);

  // --------------------------------------------------------------------
  // 4) A second release of the same pointer is refused.
  // --------------------------------------------------------------------
  if let Err(err) = allocator.release(a1.as_ptr()) {
    println!("\n[4] Second release refused: {err}");
  }
  block_until_enter_pressed(wait);

  // --------------------------------------------------------------------
  // 5) Release the last block. Everything coalesces back into one block.
  // --------------------------------------------------------------------
  allocator.release(a3.as_ptr())?;
  println!("\n[5] Released the 25-byte block");
  println!("{allocator}");
  println!("{:?}", allocator.stats());

  Ok(())
}
