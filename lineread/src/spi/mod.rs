//! L4 SPI: external provider integration (empty for now).
