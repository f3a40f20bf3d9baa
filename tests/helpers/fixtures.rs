use std::path::Path;

#[allow(dead_code)]
pub fn copy_dir_recursive(src: &Path, dst: &Path) {
    if !dst.exists() {
        std::fs::create_dir_all(dst).expect("Failed to create dir");
    }
    for entry in std::fs::read_dir(src).expect("Failed to read dir") {
        let entry = entry.expect("Failed to read entry");
        let src_path = entry.path();
        let dst_path = dst.join(entry.file_name());
        if src_path.is_dir() {
            copy_dir_recursive(&src_path, &dst_path);
        } else {
            std::fs::copy(&src_path, &dst_path).expect("Failed to copy file");
        }
    }
}

pub fn write_file(dir: &Path, rel: &str, contents: &str) {
    let path = dir.join(rel);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).expect("create parent dir");
    }
    std::fs::write(&path, contents).expect("write fixture file");
}
