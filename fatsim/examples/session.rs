use fatsim::{report, FileManager};

pub fn main() {
    let mut fm = FileManager::with_defaults().expect("should create");

    fm.create_file("readme", b"A tiny FAT file system.").unwrap();
    fm.create_dir("docs").unwrap();
    fm.enter_dir("docs").unwrap();
    fm.create_file("todo", b"write more files").unwrap();
    fm.truncate_file("todo", 5).unwrap();
    fm.enter_root();
    fm.delete_file("readme").unwrap();

    println!("{}", report::render_tree(fm.tree()));
    println!("{}", report::render_bitmap(&fm.engine().occupancy_snapshot()));
    println!("{}", report::render_fat(&fm.engine().chain_snapshot()));
    println!("free: {} bytes", fm.engine().free_space());

    let disk = fm.engine().disk().as_bytes();
    let block_size = fm.engine().block_size();
    println!("{}", report::render_chars(&disk[..64], block_size));
    println!("{}", report::render_binary(&disk[..32], block_size));
    println!("{}", report::render_binary(fm.engine().bitmap_bytes(), block_size));
}
