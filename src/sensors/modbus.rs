//! Modbus RTU access to the RS485 soil probe.
//!
//! Only "read holding registers" (function 0x03) of a single register is
//! needed; every metric lives in its own register.

use std::io;
use std::time;

use rmodbus::client::ModbusRequest;
use rmodbus::ModbusProto;

use super::{Metric, SensorPort};
use crate::error::{BusError, SensorReadError};

const EXCEPTION_FLAG: u8 = 0x80;

pub struct ModbusPort<T> {
    transport: T,
    address: u8,
}

impl ModbusPort<Box<dyn serialport::SerialPort>> {
    /// Opens the serial device at 8N1 with an explicit read timeout so a
    /// silent probe fails the read instead of stalling the cycle.
    pub fn open(
        device: &str,
        baud_rate: u32,
        timeout: time::Duration,
        address: u8,
    ) -> Result<Self, failure::Error> {
        let port = serialport::new(device, baud_rate)
            .data_bits(serialport::DataBits::Eight)
            .parity(serialport::Parity::None)
            .stop_bits(serialport::StopBits::One)
            .timeout(timeout)
            .open()?;

        Ok(ModbusPort::new(port, address))
    }
}

impl<T> ModbusPort<T>
where
    T: io::Read + io::Write,
{
    pub fn new(transport: T, address: u8) -> Self {
        ModbusPort { transport, address }
    }

    pub fn address(&self) -> u8 {
        self.address
    }

    /// Reads one register and scales it by its implied decimal places.
    pub fn read_register(&mut self, register: u16, decimals: u8) -> Result<f64, BusError> {
        let raw = self.read_raw(register)?;
        Ok(f64::from(raw) / 10f64.powi(i32::from(decimals)))
    }

    fn read_raw(&mut self, register: u16) -> Result<u16, BusError> {
        let mut request = ModbusRequest::new(self.address, ModbusProto::Rtu);
        let mut frame: Vec<u8> = Vec::with_capacity(8);
        request
            .generate_get_holdings(register, 1, &mut frame)
            .map_err(BusError::Frame)?;
        self.transport.write_all(&frame)?;
        self.transport.flush()?;

        // An exception reply is 5 bytes long, a single-register reply 7; the
        // first 5 bytes tell which one is coming.
        let mut reply = [0u8; 7];
        self.transport.read_exact(&mut reply[..5])?;
        let reply = if reply[1] & EXCEPTION_FLAG != 0 {
            &reply[..5]
        } else {
            self.transport.read_exact(&mut reply[5..])?;
            &reply[..]
        };

        let mut values: Vec<u16> = Vec::with_capacity(1);
        request
            .parse_u16(reply, &mut values)
            .map_err(|kind| classify(kind, reply))?;
        values
            .first()
            .cloned()
            .ok_or_else(|| BusError::Malformed("reply carries no register".to_owned()))
    }
}

impl<T> SensorPort for ModbusPort<T>
where
    T: io::Read + io::Write,
{
    fn read(&mut self, metric: Metric) -> Result<f64, SensorReadError> {
        self.read_register(metric.register(), metric.decimals())
            .map_err(|cause| SensorReadError { metric, cause })
    }
}

/// An intact exception frame carries the device's own code.
fn classify(kind: rmodbus::ErrorKind, reply: &[u8]) -> BusError {
    match kind {
        rmodbus::ErrorKind::FrameCRCError | rmodbus::ErrorKind::FrameBroken => {
            BusError::Frame(kind)
        }
        _ if reply[1] & EXCEPTION_FLAG != 0 => BusError::Exception(reply[2]),
        _ => BusError::Frame(kind),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Wire {
        written: Vec<u8>,
        reply: io::Cursor<Vec<u8>>,
    }

    impl Wire {
        fn replying(reply: &[u8]) -> Self {
            Wire {
                written: Vec::new(),
                reply: io::Cursor::new(reply.to_vec()),
            }
        }
    }

    impl io::Read for Wire {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            io::Read::read(&mut self.reply, buf)
        }
    }

    impl io::Write for Wire {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.written.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn reads_moisture_register() {
        let mut port = ModbusPort::new(
            Wire::replying(&[0x01, 0x03, 0x02, 0x01, 0x2c, 0xb8, 0x09]),
            1,
        );

        let moisture = port.read(Metric::Moisture).unwrap();

        assert_eq!(moisture, 30.0);
        assert_eq!(
            port.transport.written,
            vec![0x01, 0x03, 0x00, 0x12, 0x00, 0x01, 0x24, 0x0f]
        );
    }

    #[test]
    fn frames_register_address_and_crc() {
        let mut port = ModbusPort::new(
            Wire::replying(&[0x01, 0x03, 0x02, 0x02, 0x8a, 0x38, 0x83]),
            1,
        );

        let ph = port.read(Metric::Ph).unwrap();

        assert_eq!(ph, 6.5);
        assert_eq!(
            port.transport.written,
            vec![0x01, 0x03, 0x00, 0x06, 0x00, 0x01, 0x64, 0x0b]
        );
    }

    #[test]
    fn surfaces_exception_replies() {
        let mut port = ModbusPort::new(Wire::replying(&[0x01, 0x83, 0x02, 0xc0, 0xf1]), 1);

        let err = port.read(Metric::Ph).unwrap_err();

        assert_eq!(err.metric, Metric::Ph);
        match err.cause {
            BusError::Exception(0x02) => {}
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn rejects_corrupted_reply() {
        let mut port = ModbusPort::new(
            Wire::replying(&[0x01, 0x03, 0x02, 0x01, 0x2c, 0x00, 0x00]),
            1,
        );

        match port.read(Metric::Moisture).unwrap_err().cause {
            BusError::Frame(rmodbus::ErrorKind::FrameCRCError) => {}
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn short_reply_is_an_io_error() {
        let mut port = ModbusPort::new(Wire::replying(&[0x01, 0x03]), 1);

        match port.read(Metric::Nitrogen).unwrap_err().cause {
            BusError::Io(ref e) => assert_eq!(e.kind(), io::ErrorKind::UnexpectedEof),
            other => panic!("unexpected error: {}", other),
        }
    }
}
