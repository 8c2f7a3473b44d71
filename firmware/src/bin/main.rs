#![no_std]
#![no_main]

use defmt::{info, warn};
use defmt_rtt as _;
use embassy_executor::{InterruptExecutor, Spawner};
use embassy_rp::adc::{Adc, Channel as AdcChannel, Config as AdcConfig};
use embassy_rp::flash::Flash;
use embassy_rp::gpio::{Input, Level, Output, Pull};
use embassy_rp::interrupt::{InterruptExt, Priority};
use embassy_rp::peripherals::UART1;
use embassy_rp::pwm::Pwm;
use embassy_rp::uart::{Async, Config as UartConfig, Uart, UartRx, UartTx};
use embassy_rp::{bind_interrupts, interrupt};
use embassy_time::{with_timeout, Duration, Ticker, Timer};
use recovery_firmware::{
    AtomicConfig, BatteryMonitor, BoardActuators, BoardSensors, Buzzer, ConfigCommands, ConfigFlash,
    Endpoint, FlightController, ServoPwm, SharedState, FLIGHT_POLL_MS, PERSIST_DEBOUNCE_MS,
    TICK_PERIOD_MS, UART_BAUD,
};
use static_cell::StaticCell;

#[cfg(feature = "dev-panic")]
use panic_probe as _;
#[cfg(feature = "prod-panic")]
use panic_reset as _;

bind_interrupts!(struct Irqs {
    UART1_IRQ => embassy_rp::uart::InterruptHandler<UART1>;
});

/// Calibration; restored from flash at boot, written back on change.
static CONFIG: AtomicConfig = AtomicConfig::new();

/// State shared between the interrupt executor and the flight loop.
static SHARED: StaticCell<SharedState> = StaticCell::new();

/// Battery ADC, sampled by both the flight loop and the command handler.
static BATTERY: StaticCell<BatteryMonitor> = StaticCell::new();

/// Runs the tick and UART tasks at a higher priority than thread mode,
/// standing in for the timer and UART interrupts.
static EXECUTOR_HIGH: InterruptExecutor = InterruptExecutor::new();

#[interrupt]
unsafe fn SWI_IRQ_1() {
    // Safety: the executor was started on this interrupt.
    unsafe { EXECUTOR_HIGH.on_interrupt() }
}

#[embassy_executor::main]
async fn main(spawner: Spawner) {
    info!("recovery controller starting...");

    let p = embassy_rp::init(embassy_rp::config::Config::default());

    // --- Calibration ---
    let mut storage = ConfigFlash::new(Flash::new_blocking(p.FLASH));
    storage.load(&CONFIG);

    let shared: &'static SharedState = SHARED.init(SharedState::new());

    // --- Battery ---
    let adc = Adc::new_blocking(p.ADC, AdcConfig::default());
    let battery_channel = AdcChannel::new_pin(p.PIN_26, Pull::None);
    let battery: &'static BatteryMonitor = BATTERY.init(BatteryMonitor::new(adc, battery_channel));

    // --- Flight loop I/O ---
    let sensors = BoardSensors {
        vote: Input::new(p.PIN_2, Pull::Up),
        armed: Input::new(p.PIN_3, Pull::Up),
        breakwire: Input::new(p.PIN_4, Pull::Down),
        continuity: Input::new(p.PIN_5, Pull::Up),
        battery,
    };
    let mut actuators = BoardActuators {
        led: Output::new(p.PIN_25, Level::Low),
        pyro: Output::new(p.PIN_14, Level::Low),
        launch_asserted: Output::new(p.PIN_13, Level::Low),
    };

    // --- Tick outputs ---
    let buzzer = Buzzer::new(Output::new(p.PIN_15, Level::Low));
    let servo = ServoPwm::new(Pwm::new_output_a(p.PWM_SLICE0, p.PIN_16, ServoPwm::config()));

    // --- UART Setup ---
    let mut uart_config = UartConfig::default();
    uart_config.baudrate = UART_BAUD;

    let uart = Uart::new(
        p.UART1,
        p.PIN_8, // TX
        p.PIN_9, // RX
        Irqs,
        p.DMA_CH0,
        p.DMA_CH1,
        uart_config,
    );
    let (tx, rx) = uart.split();

    // High-priority executor: SWI_IRQ_1, priority level 2
    interrupt::SWI_IRQ_1.set_priority(Priority::P2);
    let high = EXECUTOR_HIGH.start(interrupt::SWI_IRQ_1);
    high.spawn(tick_task(shared, buzzer, servo).unwrap());
    high.spawn(uart_rx_task(rx, shared, battery).unwrap());
    high.spawn(uart_tx_task(tx, shared).unwrap());
    spawner.spawn(persist_task(storage).unwrap());

    info!("recovery controller initialized, entering flight loop");

    let mut flight = FlightController::new();
    loop {
        flight.poll(shared, &CONFIG, &sensors, &mut actuators);
        Timer::after_millis(FLIGHT_POLL_MS).await;
    }
}

/// Tick task - time base, beeper, buzzer and servo outputs.
#[embassy_executor::task]
async fn tick_task(shared: &'static SharedState, mut buzzer: Buzzer, mut servo: ServoPwm) {
    let mut ticker = Ticker::every(Duration::from_millis(TICK_PERIOD_MS));
    loop {
        ticker.next().await;
        if let Some(on) = shared.on_tick() {
            buzzer.set(on);
        }
        servo.apply(&shared.servo);
    }
}

/// UART RX task - frames incoming bytes and dispatches packets.
#[embassy_executor::task]
async fn uart_rx_task(
    mut rx: UartRx<'static, Async>,
    shared: &'static SharedState,
    battery: &'static BatteryMonitor,
) {
    let mut commands = ConfigCommands::new(&CONFIG, battery, &shared.servo);
    let mut endpoint = Endpoint::new();
    let mut byte = [0u8; 1];

    loop {
        if let Err(e) = rx.read(&mut byte).await {
            warn!("UART RX error: {:?}", e);
            continue;
        }
        endpoint.on_byte(byte[0], shared, &mut commands);
    }
}

/// UART TX task - writes each committed frame out byte by byte.
#[embassy_executor::task]
async fn uart_tx_task(mut tx: UartTx<'static, Async>, shared: &'static SharedState) {
    loop {
        shared.link.wait_pending().await;
        // A frame committed while draining is picked up by the same loop.
        while let Some(byte) = shared.on_tx_complete() {
            if let Err(e) = tx.write(&[byte]).await {
                // Keep draining so the link returns to idle.
                warn!("UART TX error: {:?}", e);
            }
        }
    }
}

/// Persist task - saves calibration once writes have been quiet for a while.
#[embassy_executor::task]
async fn persist_task(mut storage: ConfigFlash) {
    loop {
        CONFIG.wait_changed().await;
        // Each further change restarts the window.
        while with_timeout(Duration::from_millis(PERSIST_DEBOUNCE_MS), CONFIG.wait_changed())
            .await
            .is_ok()
        {}

        if !CONFIG.take_dirty() {
            continue;
        }
        match storage.save(&CONFIG) {
            Ok(()) => info!("calibration saved"),
            Err(e) => warn!("calibration save failed: {:?}", e),
        }
    }
}
