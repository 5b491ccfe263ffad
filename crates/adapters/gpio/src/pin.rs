//! Output pins.

use std::fs::{self, File, OpenOptions};
use std::io::{Seek, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::GpioError;

/// Root of the Linux sysfs GPIO interface.
pub const SYSFS_GPIO_ROOT: &str = "/sys/class/gpio";

/// A digital output line.
pub trait OutputPin: Send + 'static {
    /// Name the pin was opened with.
    fn name(&self) -> &str;

    /// Drive the line high (`true`) or low.
    ///
    /// # Errors
    ///
    /// Returns [`GpioError::Io`] when the level cannot be written.
    fn set_level(&mut self, high: bool) -> Result<(), GpioError>;
}

/// Parse `GPIO17`, `gpio17` or `17` into a line number.
///
/// # Errors
///
/// Returns [`GpioError::InvalidPin`] when no line number can be read.
pub fn line_number(name: &str) -> Result<u32, GpioError> {
    let digits = name
        .strip_prefix("GPIO")
        .or_else(|| name.strip_prefix("gpio"))
        .unwrap_or(name);
    digits
        .parse()
        .map_err(|_| GpioError::InvalidPin(name.to_string()))
}

/// A line driven through the sysfs GPIO interface.
pub struct SysfsPin {
    name: String,
    value: File,
}

impl SysfsPin {
    /// Export `name` if needed and configure it as an output.
    ///
    /// # Errors
    ///
    /// Returns [`GpioError::InvalidPin`] for unparsable names and
    /// [`GpioError::Io`] when sysfs refuses the export or the direction.
    pub fn open(name: &str) -> Result<Self, GpioError> {
        Self::open_at(Path::new(SYSFS_GPIO_ROOT), name)
    }

    /// Same as [`SysfsPin::open`] below a custom sysfs root.
    ///
    /// # Errors
    ///
    /// See [`SysfsPin::open`].
    pub fn open_at(root: &Path, name: &str) -> Result<Self, GpioError> {
        let line = line_number(name)?;
        let io = |source| GpioError::Io {
            pin: name.to_string(),
            source,
        };
        let dir: PathBuf = root.join(format!("gpio{line}"));
        if !dir.exists() {
            fs::write(root.join("export"), line.to_string()).map_err(io)?;
        }
        fs::write(dir.join("direction"), "out").map_err(io)?;
        let value = OpenOptions::new()
            .write(true)
            .open(dir.join("value"))
            .map_err(io)?;
        tracing::debug!(pin = %name, line, "gpio exported");
        Ok(Self {
            name: name.to_string(),
            value,
        })
    }
}

impl OutputPin for SysfsPin {
    fn name(&self) -> &str {
        &self.name
    }

    fn set_level(&mut self, high: bool) -> Result<(), GpioError> {
        let io = |source| GpioError::Io {
            pin: self.name.clone(),
            source,
        };
        self.value.rewind().map_err(io)?;
        self.value
            .write_all(if high { b"1" } else { b"0" })
            .map_err(io)
    }
}

/// A simulated line. Clones observe the same level.
#[derive(Debug, Clone)]
pub struct MemoryPin {
    name: String,
    level: Arc<AtomicBool>,
}

impl MemoryPin {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            level: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Current level of the line.
    #[must_use]
    pub fn is_high(&self) -> bool {
        self.level.load(Ordering::SeqCst)
    }
}

impl OutputPin for MemoryPin {
    fn name(&self) -> &str {
        &self.name
    }

    fn set_level(&mut self, high: bool) -> Result<(), GpioError> {
        self.level.store(high, Ordering::SeqCst);
        Ok(())
    }
}

/// Either kind of pin, chosen at configuration time.
pub enum Pin {
    Sysfs(SysfsPin),
    Memory(MemoryPin),
}

impl Pin {
    /// Open a sysfs line.
    ///
    /// # Errors
    ///
    /// See [`SysfsPin::open`].
    pub fn sysfs(name: &str) -> Result<Self, GpioError> {
        SysfsPin::open(name).map(Self::Sysfs)
    }

    /// Create a simulated line.
    #[must_use]
    pub fn memory(name: &str) -> Self {
        Self::Memory(MemoryPin::new(name))
    }
}

impl OutputPin for Pin {
    fn name(&self) -> &str {
        match self {
            Self::Sysfs(pin) => pin.name(),
            Self::Memory(pin) => pin.name(),
        }
    }

    fn set_level(&mut self, high: bool) -> Result<(), GpioError> {
        match self {
            Self::Sysfs(pin) => pin.set_level(high),
            Self::Memory(pin) => pin.set_level(high),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_parse_line_numbers() {
        assert_eq!(line_number("GPIO17").unwrap(), 17);
        assert_eq!(line_number("gpio4").unwrap(), 4);
        assert_eq!(line_number("22").unwrap(), 22);
        assert!(matches!(
            line_number("P1_11"),
            Err(GpioError::InvalidPin(_))
        ));
    }

    #[test]
    fn should_share_level_between_memory_pin_clones() {
        let pin = MemoryPin::new("GPIO5");
        let mut handle = pin.clone();
        handle.set_level(true).unwrap();
        assert!(pin.is_high());
    }

    #[test]
    fn should_write_levels_through_sysfs_files() {
        let root = std::env::temp_dir().join(format!("remoteswitch-sysfs-{}", std::process::id()));
        let line = root.join("gpio23");
        fs::create_dir_all(&line).unwrap();
        fs::write(line.join("direction"), "in").unwrap();
        fs::write(line.join("value"), "0").unwrap();

        let mut pin = SysfsPin::open_at(&root, "GPIO23").unwrap();
        pin.set_level(true).unwrap();

        assert_eq!(fs::read_to_string(line.join("direction")).unwrap(), "out");
        assert_eq!(fs::read_to_string(line.join("value")).unwrap(), "1");
        fs::remove_dir_all(&root).unwrap();
    }
}
