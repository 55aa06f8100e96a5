// Output handlers for the filtered speed feed

use std::time::UNIX_EPOCH;
use tokio::sync::broadcast;

/// One published filtered-speed value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpeedSample {
    /// UTC seconds of the publish tick.
    pub timestamp: f64,
    /// Filtered speed in m/s, rounded to one decimal place. Always finite.
    pub speed: f64,
}

/// Trait for output handlers
pub trait OutputHandler: Send + Sync {
    /// Handle a newly published speed sample
    fn handle_speed(&mut self, sample: &SpeedSample);
}

/// Plain text output: one speed value per line.
pub struct TextOutput {
    tx: Option<broadcast::Sender<Vec<u8>>>,
}

impl TextOutput {
    pub fn new(tx: Option<broadcast::Sender<Vec<u8>>>) -> Self {
        TextOutput { tx }
    }

    fn encode(sample: &SpeedSample) -> Vec<u8> {
        format!("{:.1}\n", sample.speed).into_bytes()
    }
}

impl OutputHandler for TextOutput {
    fn handle_speed(&mut self, sample: &SpeedSample) {
        let bytes = Self::encode(sample);
        if let Some(tx) = &self.tx {
            let _ = tx.send(bytes);
        }
    }
}

/// JSON output: one object per line with a UTC timestamp.
pub struct JsonOutput {
    tx: Option<broadcast::Sender<Vec<u8>>>,
}

impl JsonOutput {
    pub fn new(tx: Option<broadcast::Sender<Vec<u8>>>) -> Self {
        JsonOutput { tx }
    }

    pub fn format_json(sample: &SpeedSample) -> String {
        format!(
            "{{\"speed_mps\": {:.1}, \"ts\": {:.3}}}",
            sample.speed, sample.timestamp
        )
    }
}

impl OutputHandler for JsonOutput {
    fn handle_speed(&mut self, sample: &SpeedSample) {
        let mut line = Self::format_json(sample);
        line.push('\n');
        if let Some(tx) = &self.tx {
            let _ = tx.send(line.into_bytes());
        }
    }
}

/// CSV output appended to a local file: date,time,speed_mps
pub struct CsvOutput {
    writer: std::sync::Arc<std::sync::Mutex<std::io::BufWriter<std::fs::File>>>,
}

impl CsvOutput {
    pub fn new(path: &str) -> std::io::Result<Self> {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;
        let writer = std::io::BufWriter::new(file);
        Ok(CsvOutput {
            writer: std::sync::Arc::new(std::sync::Mutex::new(writer)),
        })
    }

    fn format_date_time(timestamp: f64) -> (String, String) {
        let secs = timestamp as i64;
        let nanos = ((timestamp - secs as f64) * 1e9) as u32;
        if let Some(tm) = UNIX_EPOCH.checked_add(std::time::Duration::new(secs as u64, nanos)) {
            let datetime = chrono::DateTime::<chrono::Utc>::from(tm);
            return (
                datetime.format("%Y/%m/%d").to_string(),
                datetime.format("%H:%M:%S.%3f").to_string(),
            );
        }
        ("".to_string(), "".to_string())
    }
}

impl OutputHandler for CsvOutput {
    fn handle_speed(&mut self, sample: &SpeedSample) {
        if let Ok(mut w) = self.writer.lock() {
            use std::io::Write;
            let (date, time) = Self::format_date_time(sample.timestamp);
            if let Err(e) = writeln!(w, "{},{},{:.1}", date, time, sample.speed) {
                eprintln!("Failed to write CSV: {}", e);
            }
            let _ = w.flush();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_output_encode() {
        let sample = SpeedSample {
            timestamp: 100.0,
            speed: 10.0,
        };
        assert_eq!(TextOutput::encode(&sample), b"10.0\n");
    }

    #[test]
    fn test_text_output_broadcasts() {
        let (tx, mut rx) = broadcast::channel(4);
        let mut output = TextOutput::new(Some(tx));

        output.handle_speed(&SpeedSample {
            timestamp: 1.0,
            speed: 5.2,
        });

        assert_eq!(rx.try_recv().unwrap(), b"5.2\n");
    }

    #[test]
    fn test_json_formatting() {
        let sample = SpeedSample {
            timestamp: 1672531200.5,
            speed: 10.0,
        };
        let json = JsonOutput::format_json(&sample);
        assert!(json.contains("\"speed_mps\": 10.0"));
        assert!(json.contains("\"ts\": 1672531200.500"));
    }

    #[test]
    fn test_csv_format_date_time() {
        let (date, time) = CsvOutput::format_date_time(1672531200.0); // 2023-01-01 00:00:00 UTC
        assert_eq!(date, "2023/01/01");
        assert_eq!(time, "00:00:00.000");
    }
}
