//! Tests for the cheep frontend (the parts that run without a window)

use super::ui::*;

mod ui_builder {
    use super::*;
    #[test]
    fn default() {
        let builder = UIBuilder::default();
        assert_eq!(builder.rate, 60);
        println!("{builder:?}");
    }
    #[test]
    fn rate_floors_at_one() {
        assert_eq!(UIBuilder::default().rate(0).rate, 1);
    }
}

mod title {
    use super::*;
    #[test]
    fn freq_units() {
        assert_eq!(format_freq(999.4), "999.40 Hz");
        assert_eq!(format_freq(250_000.0), "250.00 KHz");
        assert_eq!(format_freq(1_200_000.0), "1.20 MHz");
    }
}
