use crate::error::GpioError;
use crate::pin::OutputPin;

/// A relay on an output pin. The logical state is XORed with `inverted`
/// before it reaches the pin.
pub(crate) struct Relay<P> {
    pin: P,
    inverted: bool,
    energized: bool,
}

impl<P: OutputPin> Relay<P> {
    pub(crate) fn new(pin: P, inverted: bool) -> Self {
        Self {
            pin,
            inverted,
            energized: false,
        }
    }

    pub(crate) fn name(&self) -> &str {
        self.pin.name()
    }

    pub(crate) fn is_energized(&self) -> bool {
        self.energized
    }

    pub(crate) fn set(&mut self, energized: bool) -> Result<(), GpioError> {
        self.pin.set_level(energized ^ self.inverted)?;
        self.energized = energized;
        Ok(())
    }
}
