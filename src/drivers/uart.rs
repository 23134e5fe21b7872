//! UART-backed [`SerialPort`](crate::link::SerialPort) for the host links.
//!
//! Thin wrapper over the ESP-IDF UART driver.  Reads are polled with a
//! millisecond deadline rather than converted to RTOS ticks; the wait
//! yields one tick per pass so the idle task stays fed during a link's
//! bounded 4 s stall.  `reset` deletes and reinstalls the driver at the
//! same baud, which is what gets a desynchronized host back to a clean
//! line.
//!
//! ## Dual-target design
//!
//! On ESP-IDF: drives a real UART through the IDF driver.
//! On host/test: a dead port (never readable, writes discarded); the
//! link tests use in-memory mocks instead.

#[cfg(target_os = "espidf")]
use esp_idf_svc::sys::*;

#[cfg(target_os = "espidf")]
use log::warn;

#[cfg(target_os = "espidf")]
use crate::clock::elapsed_ms;
use crate::drivers::hw_init::HwInitError;
use crate::link::SerialPort;

#[cfg(target_os = "espidf")]
const UART_PIN_NO_CHANGE: i32 = -1;

#[cfg(target_os = "espidf")]
const RX_BUFFER_BYTES: i32 = 256;

pub struct UartPort {
    #[cfg(target_os = "espidf")]
    uart_num: i32,
    #[cfg(target_os = "espidf")]
    baud: u32,
    #[cfg(target_os = "espidf")]
    tx_gpio: i32,
    #[cfg(target_os = "espidf")]
    rx_gpio: i32,
}

#[cfg(target_os = "espidf")]
impl UartPort {
    pub fn new(uart_num: i32, baud: u32, tx_gpio: i32, rx_gpio: i32) -> Result<Self, HwInitError> {
        let port = Self {
            uart_num,
            baud,
            tx_gpio,
            rx_gpio,
        };
        port.install()?;
        Ok(port)
    }

    fn install(&self) -> Result<(), HwInitError> {
        let cfg = uart_config_t {
            baud_rate: self.baud as i32,
            data_bits: uart_word_length_t_UART_DATA_8_BITS,
            parity: uart_parity_t_UART_PARITY_DISABLE,
            stop_bits: uart_stop_bits_t_UART_STOP_BITS_1,
            flow_ctrl: uart_hw_flowcontrol_t_UART_HW_FLOWCTRL_DISABLE,
            ..Default::default()
        };

        // SAFETY: main-task init; the driver for this port is not installed
        // yet (or was just deleted by reset()).
        unsafe {
            let ret = uart_param_config(self.uart_num, &cfg);
            if ret != ESP_OK as i32 {
                return Err(HwInitError::UartInitFailed(ret));
            }
            let ret = uart_set_pin(
                self.uart_num,
                self.tx_gpio,
                self.rx_gpio,
                UART_PIN_NO_CHANGE,
                UART_PIN_NO_CHANGE,
            );
            if ret != ESP_OK as i32 {
                return Err(HwInitError::UartInitFailed(ret));
            }
            let ret = uart_driver_install(
                self.uart_num,
                RX_BUFFER_BYTES,
                0,
                0,
                core::ptr::null_mut(),
                0,
            );
            if ret != ESP_OK as i32 {
                return Err(HwInitError::UartInitFailed(ret));
            }
        }
        Ok(())
    }

    fn now_ms() -> u32 {
        // SAFETY: esp_timer_get_time is a monotonic counter read.
        ((unsafe { esp_timer_get_time() }) / 1_000) as u32
    }
}

#[cfg(not(target_os = "espidf"))]
impl UartPort {
    pub fn new(
        uart_num: i32,
        _baud: u32,
        _tx_gpio: i32,
        _rx_gpio: i32,
    ) -> Result<Self, HwInitError> {
        log::info!("uart{uart_num}(sim): dead port");
        Ok(Self {})
    }
}

#[cfg(target_os = "espidf")]
impl SerialPort for UartPort {
    fn available(&self) -> bool {
        let mut len: usize = 0;
        // SAFETY: driver installed in new(); read-only queue query.
        let ret = unsafe { uart_get_buffered_data_len(self.uart_num, &mut len) };
        ret == ESP_OK as i32 && len > 0
    }

    fn read_byte(&mut self, timeout_ms: u32) -> Option<u8> {
        let start = Self::now_ms();
        loop {
            let mut byte: u8 = 0;
            // SAFETY: driver installed; a zero-tick read never blocks.
            let got = unsafe { uart_read_bytes(self.uart_num, (&raw mut byte).cast(), 1, 0) };
            if got == 1 {
                return Some(byte);
            }
            if elapsed_ms(start, Self::now_ms()) >= timeout_ms {
                return None;
            }
            // SAFETY: plain task yield, keeps the idle task fed.
            unsafe { vTaskDelay(1) };
        }
    }

    fn write_byte(&mut self, byte: u8) {
        // SAFETY: driver installed; TX copies into the driver buffer.
        unsafe {
            uart_write_bytes(self.uart_num, (&raw const byte).cast(), 1);
        }
    }

    fn write_bytes(&mut self, bytes: &[u8]) {
        // SAFETY: driver installed; `bytes` outlives the blocking copy.
        unsafe {
            uart_write_bytes(self.uart_num, bytes.as_ptr().cast(), bytes.len());
        }
    }

    fn reset(&mut self) {
        // SAFETY: delete is valid while installed; install() re-arms the
        // same port at the same baud.
        unsafe {
            uart_driver_delete(self.uart_num);
        }
        if let Err(err) = self.install() {
            warn!("uart{}: reinstall failed ({err})", self.uart_num);
        }
    }
}

#[cfg(not(target_os = "espidf"))]
impl SerialPort for UartPort {
    fn available(&self) -> bool {
        false
    }

    fn read_byte(&mut self, _timeout_ms: u32) -> Option<u8> {
        None
    }

    fn write_byte(&mut self, _byte: u8) {}

    fn reset(&mut self) {}
}
