//! Application commands: calibration getters and setters.
//!
//! Command ids follow a fixed pattern: `0x10 | n` reads parameter `n`,
//! `0x20 | n` writes it. Word parameters travel little-endian.

use lbp_proto::Packet;

use crate::config::{ByteSlot, ConfigStore, WordSlot};
use crate::dispatch::{nack, CommandHandler};
use crate::io::BatterySensor;
use crate::link::TxLease;
use crate::timebase::ServoPulse;

const GET_BASE: u8 = 0x10;
const SET_BASE: u8 = 0x20;
const PARAM_MASK: u8 = 0x0F;

/// Where a parameter lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Target {
    Word(WordSlot),
    Byte(ByteSlot),
    /// Live battery reading.
    Battery,
    /// Immediate servo command, not persisted.
    Servo,
}

impl Target {
    const fn width(self) -> usize {
        match self {
            Self::Word(_) => 2,
            _ => 1,
        }
    }
}

/// One row of the parameter table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Param {
    pub index: u8,
    pub target: Target,
    pub readable: bool,
    pub writable: bool,
}

const fn param(index: u8, target: Target, readable: bool, writable: bool) -> Param {
    Param {
        index,
        target,
        readable,
        writable,
    }
}

/// Parameters by index; ids `0x10 | index` and `0x20 | index`.
pub const PARAMS: [Param; 10] = [
    param(0x0, Target::Word(WordSlot::MinDeployTime), true, true),
    param(0x1, Target::Word(WordSlot::MaxDeployTime), true, true),
    param(0x2, Target::Word(WordSlot::LastDeployTime), true, false),
    param(0x3, Target::Battery, true, false),
    param(0x4, Target::Byte(ByteSlot::BatteryEmptyLimit), true, true),
    param(0x5, Target::Byte(ByteSlot::DeployMode), true, true),
    param(0x6, Target::Byte(ByteSlot::ServoClosedPosition), true, true),
    param(0x7, Target::Byte(ByteSlot::ServoOpenPosition), true, true),
    param(0x8, Target::Servo, false, true),
    param(0x9, Target::Byte(ByteSlot::Address), true, true),
];

/// A decoded application command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConfigCommand {
    Get(Param),
    Set(Param),
}

impl ConfigCommand {
    /// Decode `id`, or `None` if no such getter/setter exists.
    #[must_use]
    pub fn from_id(id: u8) -> Option<Self> {
        let index = id & PARAM_MASK;
        let param = PARAMS.iter().copied().find(|p| p.index == index)?;
        match id & !PARAM_MASK {
            GET_BASE if param.readable => Some(Self::Get(param)),
            SET_BASE if param.writable => Some(Self::Set(param)),
            _ => None,
        }
    }
}

/// [`CommandHandler`] serving the calibration parameters.
pub struct ConfigCommands<'a, C: ?Sized, B: ?Sized> {
    config: &'a C,
    battery: &'a B,
    servo: &'a ServoPulse,
}

impl<'a, C, B> ConfigCommands<'a, C, B>
where
    C: ConfigStore + ?Sized,
    B: BatterySensor + ?Sized,
{
    pub fn new(config: &'a C, battery: &'a B, servo: &'a ServoPulse) -> Self {
        Self {
            config,
            battery,
            servo,
        }
    }

    fn read(&self, target: Target, out: &mut [u8]) {
        match target {
            Target::Word(slot) => out[..2].copy_from_slice(&self.config.read_u16(slot).to_le_bytes()),
            Target::Byte(slot) => out[0] = self.config.read_u8(slot),
            Target::Battery => out[0] = self.battery.battery_level(),
            Target::Servo => {}
        }
    }

    fn write(&self, target: Target, value: &[u8]) {
        match (target, value) {
            (Target::Word(slot), &[lo, hi]) => self.config.write_u16(slot, u16::from_le_bytes([lo, hi])),
            (Target::Byte(slot), &[byte]) => self.config.write_u8(slot, byte),
            (Target::Servo, &[position]) => self.servo.set_position(position),
            _ => {}
        }
    }
}

impl<C, B> CommandHandler for ConfigCommands<'_, C, B>
where
    C: ConfigStore + ?Sized,
    B: BatterySensor + ?Sized,
{
    fn handle(&mut self, request: &Packet, payload_len: usize, mut reply: TxLease<'_>) {
        let payload = request.payload(payload_len);
        let len = match ConfigCommand::from_id(request.id) {
            Some(ConfigCommand::Get(param)) if payload.is_empty() => {
                self.read(param.target, &mut reply.data);
                param.target.width()
            }
            Some(ConfigCommand::Set(param)) if payload.len() == param.target.width() => {
                self.write(param.target, payload);
                reply.data[..payload.len()].copy_from_slice(payload);
                debug!("set {} = {=[u8]}", param.target, payload);
                payload.len()
            }
            _ => {
                debug!("nack id {=u8:#x} len {=usize}", request.id, payload_len);
                nack(reply);
                return;
            }
        };
        reply.id = request.id;
        if reply.send(len).is_err() {
            warn!("reply to {=u8:#x} lost", request.id);
        }
    }
}
