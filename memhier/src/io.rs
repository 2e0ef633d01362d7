use std::fs::File;
use std::io::BufRead;
use std::path::Path;

use crate::error::SimError;

/// Opens a trace file for line-oriented reading
pub fn open_trace(path: impl AsRef<Path>) -> Result<impl BufRead, SimError> {
    let file = File::open(path)?;
    // Compatibility on other systems
    #[cfg(not(unix))]
    {
        use std::io::BufReader;
        Ok(BufReader::with_capacity(1 << 16, file))
    }
    // Memory map the file on unix systems; traces run to hundreds of MB and
    // are consumed strictly front to back
    #[cfg(unix)]
    {
        use memmap2::{Advice, Mmap};
        use std::io::Cursor;
        unsafe {
            let m = Mmap::map(&file)?;
            m.advise(Advice::Sequential)?;
            Ok(Cursor::new(m))
        }
    }
}
