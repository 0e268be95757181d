use std::{
    fs,
    io::{self, Write},
    path::Path,
};

/// The outside world as seen by the I/O built-ins.
///
/// Each call acquires whatever OS handles it needs and releases them before
/// returning, whether it succeeds or not.
pub trait Io {
    fn print(&mut self, text: &str) -> io::Result<()>;
    fn read_file(&mut self, path: &Path) -> io::Result<String>;
    fn write_file(&mut self, path: &Path, contents: &str) -> io::Result<()>;
    fn append_file(&mut self, path: &Path, contents: &str) -> io::Result<()>;
    fn file_exists(&mut self, path: &Path) -> io::Result<bool>;
    fn delete_file(&mut self, path: &Path) -> io::Result<()>;
}

/// Process stdout and the local file system.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdIo;

impl Io for StdIo {
    fn print(&mut self, text: &str) -> io::Result<()> {
        let mut stdout = io::stdout().lock();
        stdout.write_all(text.as_bytes())?;
        stdout.flush()
    }

    fn read_file(&mut self, path: &Path) -> io::Result<String> {
        fs::read_to_string(path)
    }

    fn write_file(&mut self, path: &Path, contents: &str) -> io::Result<()> {
        fs::write(path, contents)
    }

    fn append_file(&mut self, path: &Path, contents: &str) -> io::Result<()> {
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;
        file.write_all(contents.as_bytes())
    }

    fn file_exists(&mut self, path: &Path) -> io::Result<bool> {
        path.try_exists()
    }

    fn delete_file(&mut self, path: &Path) -> io::Result<()> {
        fs::remove_file(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.txt");
        let mut io = StdIo;

        assert!(!io.file_exists(&path).unwrap());
        io.write_file(&path, "a").unwrap();
        io.append_file(&path, "b").unwrap();
        assert_eq!(io.read_file(&path).unwrap(), "ab");
        io.delete_file(&path).unwrap();
        assert!(!io.file_exists(&path).unwrap());
    }

    #[test]
    fn test_read_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = StdIo.read_file(&dir.path().join("missing")).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }
}
