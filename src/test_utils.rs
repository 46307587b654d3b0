use crate::hcidump::{Frame, parse_stream};

/// A short hcidump session: startup banners, scan setup traffic, one Apple
/// beacon, two RuuviTag format 3 advertisements and a final scan-disable
/// command whose frame is still buffered when the stream ends.
pub const DEMO_STREAM: &str = "\
HCI sniffer - Bluetooth packet analyzer ver 5.50
device: hci0 snap_len: 1500 filter: 0xffffffffffffffff
< 01 0B 20 07 01 10 00 10 00 00 00
> 04 0E 04 01 0B 20 00
< 01 0C 20 02 01 00
> 04 0E 04 01 0C 20 00
> 04 3E 1B 02 01 00 00 26 1B C6 08 03 60 0F 02 01 1A 0B FF 4C 00
  09 06 03 15 C0 A8 0A 25 A8
> 04 3E 21 02 01 03 01 15 90 09 36 72 FB 15 02 01 06 11 FF 99 04
  03 47 13 44 BE EB 00 31 FF D7 04 0A 0C 55 BE
> 04 3E 21 02 01 03 01 65 EF 7E 12 FA E5 15 02 01 06 11 FF 99 04
  03 AE 01 0D C2 5A 02 1E 01 A5 FD 2A 0B 1D C1
< 01 0C 20 02 00 00
> 04 0E 04 01 0C 20 00
";

/// All frames reassembled from [`DEMO_STREAM`].
pub fn demo_frames() -> Vec<Frame> {
    let mut frames = Vec::new();
    parse_stream(DEMO_STREAM.as_bytes(), |frame| frames.push(frame))
        .expect("demo stream is well formed");
    frames
}
