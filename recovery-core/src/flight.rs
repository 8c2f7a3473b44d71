//! Flight state machine.
//!
//! Polled from the main loop. Each poll samples the inputs once, runs
//! the pure [`transition`] function for the current state and then
//! applies the resulting actions, so the safety logic can be tested
//! without hardware.

use heapless::Vec;
use portable_atomic::{AtomicU8, Ordering};

use crate::beeper::{BEEP_LONG, BEEP_SHORT};
use crate::config::{ByteSlot, ConfigStore, DeployMode, WordSlot};
use crate::io::{Actuators, Sensors};
use crate::shared::SharedState;

/// Safety progression of one flight.
///
/// Ordered: every state from [`Armed`](Self::Armed) on counts as armed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum FlightState {
    Error = 0,
    SystemsCheck = 1,
    Idle = 2,
    Preparation = 3,
    Armed = 4,
    Launched = 5,
    Deployed = 6,
}

impl FlightState {
    const fn from_raw(raw: u8) -> Self {
        match raw {
            1 => Self::SystemsCheck,
            2 => Self::Idle,
            3 => Self::Preparation,
            4 => Self::Armed,
            5 => Self::Launched,
            6 => Self::Deployed,
            _ => Self::Error,
        }
    }

    #[inline]
    #[must_use]
    pub fn is_armed(self) -> bool {
        self >= Self::Armed
    }
}

/// Latest flight state, readable from interrupt context.
pub struct FlightStatus {
    state: AtomicU8,
}

impl FlightStatus {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            state: AtomicU8::new(FlightState::SystemsCheck as u8),
        }
    }

    pub fn publish(&self, state: FlightState) {
        self.state.store(state as u8, Ordering::Release);
    }

    #[must_use]
    pub fn get(&self) -> FlightState {
        FlightState::from_raw(self.state.load(Ordering::Acquire))
    }

    #[must_use]
    pub fn is_armed(&self) -> bool {
        self.get().is_armed()
    }

    #[must_use]
    pub fn is_error(&self) -> bool {
        self.get() == FlightState::Error
    }
}

impl Default for FlightStatus {
    fn default() -> Self {
        Self::new()
    }
}

/// One sample of everything a transition may look at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FlightInputs {
    pub armed: bool,
    pub breakwire_connected: bool,
    pub continuity: bool,
    pub vote: bool,
    pub battery: u8,
    /// No beeps pending.
    pub beeper_idle: bool,
    /// Ticks since the time base was last reset.
    pub elapsed: u16,
}

impl FlightInputs {
    pub fn sample<S: Sensors + ?Sized>(sensors: &S, shared: &SharedState) -> Self {
        Self {
            armed: sensors.is_armed(),
            breakwire_connected: sensors.is_breakwire_connected(),
            continuity: sensors.has_continuity(),
            vote: sensors.is_vote_asserted(),
            battery: sensors.battery_level(),
            beeper_idle: shared.beeper.pending_count() == 0,
            elapsed: shared.time.get(),
        }
    }
}

/// Calibration used by the state machine, read once per poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FlightSettings {
    pub min_deploy_time: u16,
    pub max_deploy_time: u16,
    pub battery_empty_limit: u8,
    pub mode: DeployMode,
    pub servo_closed: u8,
    pub servo_open: u8,
}

impl FlightSettings {
    pub fn load<C: ConfigStore + ?Sized>(config: &C) -> Self {
        Self {
            min_deploy_time: config.read_u16(WordSlot::MinDeployTime),
            max_deploy_time: config.read_u16(WordSlot::MaxDeployTime),
            battery_empty_limit: config.read_u8(ByteSlot::BatteryEmptyLimit),
            mode: config.deploy_mode(),
            servo_closed: config.read_u8(ByteSlot::ServoClosedPosition),
            servo_open: config.read_u8(ByteSlot::ServoOpenPosition),
        }
    }

    fn pyro_without_continuity(&self, inputs: &FlightInputs) -> bool {
        self.mode == DeployMode::Pyro && !inputs.continuity
    }
}

/// Side effect requested by a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Action {
    Beep(u8),
    StatusLed(bool),
    ServoPosition(u8),
    FirePyro,
    ResetTimer,
    LaunchAsserted,
    /// Persist the launch-to-deploy time.
    LogDeployTime(u16),
}

/// Upper bound on actions from a single transition.
pub const MAX_ACTIONS: usize = 6;

/// Result of one transition: the next state and the actions to apply in
/// order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    pub next: FlightState,
    pub actions: Vec<Action, MAX_ACTIONS>,
}

impl Step {
    fn stay(state: FlightState) -> Self {
        Self {
            next: state,
            actions: Vec::new(),
        }
    }

    fn then(mut self, action: Action) -> Self {
        // No transition emits more than MAX_ACTIONS.
        let _ = self.actions.push(action);
        self
    }

    fn to(mut self, next: FlightState) -> Self {
        self.next = next;
        self
    }

    /// Two short beeps and the status LED on: "all good".
    fn ready(self) -> Self {
        self.then(Action::Beep(BEEP_SHORT))
            .then(Action::Beep(BEEP_SHORT))
            .then(Action::StatusLed(true))
    }
}

/// Compute the next state and its side effects.
///
/// Rules are checked top to bottom for the current state only; the first
/// match wins.
#[must_use]
pub fn transition(state: FlightState, inputs: &FlightInputs, settings: &FlightSettings) -> Step {
    let step = Step::stay(state);
    match state {
        FlightState::Error => error(step, inputs, settings),
        FlightState::SystemsCheck => systems_check(step, inputs, settings),
        FlightState::Idle => idle(step, inputs),
        FlightState::Preparation => preparation(step, inputs, settings),
        FlightState::Armed => armed(step, inputs),
        FlightState::Launched => launched(step, inputs, settings),
        FlightState::Deployed => deployed(step, inputs),
    }
}

fn error(mut step: Step, inputs: &FlightInputs, settings: &FlightSettings) -> Step {
    if inputs.beeper_idle {
        step = step.then(Action::Beep(BEEP_LONG));
    }
    let cleared = !inputs.armed
        && inputs.battery > settings.battery_empty_limit
        && !settings.pyro_without_continuity(inputs);
    if cleared {
        step.ready().to(FlightState::Idle)
    } else {
        step
    }
}

fn systems_check(mut step: Step, inputs: &FlightInputs, settings: &FlightSettings) -> Step {
    if settings.mode == DeployMode::Servo {
        step = step.then(Action::ServoPosition(settings.servo_closed));
    }
    if inputs.battery <= settings.battery_empty_limit || settings.pyro_without_continuity(inputs) {
        return step.to(FlightState::Error);
    }
    step.ready().to(FlightState::Idle)
}

fn idle(step: Step, inputs: &FlightInputs) -> Step {
    if inputs.armed {
        return step.to(FlightState::Error);
    }
    if inputs.breakwire_connected {
        return step
            .then(Action::Beep(BEEP_SHORT))
            .then(Action::Beep(BEEP_SHORT))
            .then(Action::StatusLed(false))
            .to(FlightState::Preparation);
    }
    step
}

fn preparation(step: Step, inputs: &FlightInputs, settings: &FlightSettings) -> Step {
    if !inputs.breakwire_connected {
        return step
            .then(Action::Beep(BEEP_LONG))
            .then(Action::StatusLed(true))
            .to(FlightState::Idle);
    }
    if !inputs.armed {
        return step;
    }
    if settings.pyro_without_continuity(inputs) {
        step.to(FlightState::Error)
    } else {
        step.ready().to(FlightState::Armed)
    }
}

fn armed(step: Step, inputs: &FlightInputs) -> Step {
    if !inputs.armed {
        return step
            .then(Action::Beep(BEEP_LONG))
            .then(Action::StatusLed(false))
            .to(FlightState::Preparation);
    }
    if !inputs.breakwire_connected {
        return step
            .then(Action::ResetTimer)
            .then(Action::LaunchAsserted)
            .to(FlightState::Launched);
    }
    step
}

fn launched(mut step: Step, inputs: &FlightInputs, settings: &FlightSettings) -> Step {
    if inputs.beeper_idle {
        step = step.then(Action::Beep(BEEP_SHORT));
    }
    let elapsed = inputs.elapsed;
    let deploy = elapsed >= settings.max_deploy_time
        || (elapsed >= settings.min_deploy_time && inputs.vote);
    if !deploy {
        return step;
    }
    let actuate = match settings.mode {
        DeployMode::Servo => Action::ServoPosition(settings.servo_open),
        DeployMode::Pyro => Action::FirePyro,
    };
    step.then(actuate)
        .then(Action::LogDeployTime(elapsed))
        .to(FlightState::Deployed)
}

fn deployed(step: Step, inputs: &FlightInputs) -> Step {
    if inputs.beeper_idle {
        step.then(Action::Beep(BEEP_LONG))
    } else {
        step
    }
}

/// Owner of the flight state; lives on the main loop.
pub struct FlightController {
    state: FlightState,
}

impl FlightController {
    /// Start in [`FlightState::SystemsCheck`].
    #[must_use]
    pub const fn new() -> Self {
        Self {
            state: FlightState::SystemsCheck,
        }
    }

    #[must_use]
    pub fn state(&self) -> FlightState {
        self.state
    }

    /// Run one iteration of the state machine and publish the result.
    pub fn poll<C, S, A>(
        &mut self,
        shared: &SharedState,
        config: &C,
        sensors: &S,
        actuators: &mut A,
    ) -> FlightState
    where
        C: ConfigStore + ?Sized,
        S: Sensors + ?Sized,
        A: Actuators + ?Sized,
    {
        let settings = FlightSettings::load(config);
        let inputs = FlightInputs::sample(sensors, shared);
        let step = transition(self.state, &inputs, &settings);

        for action in &step.actions {
            match *action {
                Action::Beep(duration) => shared.beeper.enqueue(duration),
                Action::StatusLed(on) => actuators.set_status_led(on),
                Action::ServoPosition(position) => shared.servo.set_position(position),
                Action::FirePyro => actuators.set_pyro(true),
                Action::ResetTimer => shared.time.reset(),
                Action::LaunchAsserted => actuators.set_launch_asserted(true),
                Action::LogDeployTime(ticks) => {
                    config.write_u16(WordSlot::LastDeployTime, ticks);
                }
            }
        }

        if step.next != self.state {
            match step.next {
                FlightState::Error => warn!("flight: {} -> Error", self.state),
                FlightState::Launched => info!("launch detected"),
                FlightState::Deployed => info!("deployed after {=u16} ticks", inputs.elapsed),
                next => info!("flight: {} -> {}", self.state, next),
            }
        }
        self.state = step.next;
        shared.status.publish(self.state);
        self.state
    }
}

impl Default for FlightController {
    fn default() -> Self {
        Self::new()
    }
}
