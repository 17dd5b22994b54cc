use heapless::FnvIndexMap;

/// Physical quantities the attached sensors can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Quantity {
    Temperature,
    Humidity,
    Pressure,
    Co2,
    Pm2_5,
    Pm10,
}

impl Quantity {
    pub const ALL: [Quantity; 6] = [
        Quantity::Temperature,
        Quantity::Humidity,
        Quantity::Pressure,
        Quantity::Co2,
        Quantity::Pm2_5,
        Quantity::Pm10,
    ];

    /// Key used in inference request payloads.
    pub fn key(self) -> &'static str {
        match self {
            Quantity::Temperature => "temperature",
            Quantity::Humidity => "humidity",
            Quantity::Pressure => "pressure",
            Quantity::Co2 => "co2",
            Quantity::Pm2_5 => "pm2_5",
            Quantity::Pm10 => "pm10",
        }
    }

    /// ThingSpeak channel field the quantity is charted on.
    pub fn field(self) -> u8 {
        match self {
            Quantity::Temperature => 1,
            Quantity::Humidity => 2,
            Quantity::Pressure => 3,
            Quantity::Co2 => 4,
            Quantity::Pm2_5 => 5,
            Quantity::Pm10 => 6,
        }
    }
}

/// One sample from every sensor that answered during a cycle.
///
/// Insertion order is kept, and a later reading of the same quantity
/// (e.g. temperature from both BME280 and SCD30) replaces the earlier one.
#[derive(Default, Debug)]
pub struct Readings {
    data: FnvIndexMap<Quantity, f32, 8>,
}

impl Readings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, quantity: Quantity, value: f32) {
        if value.is_finite() {
            // capacity exceeds the number of quantities, insert cannot fail
            self.data.insert(quantity, value).ok();
        } else {
            log::warn!("Dropping non-finite {} reading", quantity.key());
        }
    }

    pub fn get(&self, quantity: Quantity) -> Option<f32> {
        self.data.get(&quantity).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Quantity, f32)> + '_ {
        self.data.iter().map(|(q, v)| (*q, *v))
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fields_are_distinct_and_leave_room_for_prediction() {
        let mut seen = [false; 9];
        for quantity in Quantity::ALL {
            let field = quantity.field() as usize;
            assert!((1..=6).contains(&field));
            assert!(!seen[field]);
            seen[field] = true;
        }
    }

    #[test]
    fn later_reading_replaces_earlier() {
        let mut readings = Readings::new();
        readings.add(Quantity::Temperature, 20.0);
        readings.add(Quantity::Humidity, 40.0);
        readings.add(Quantity::Temperature, 21.5);

        assert_eq!(readings.len(), 2);
        assert_eq!(readings.get(Quantity::Temperature), Some(21.5));
        let order: Vec<_> = readings.iter().map(|(q, _)| q).collect();
        assert_eq!(order, [Quantity::Temperature, Quantity::Humidity]);
    }

    #[test]
    fn non_finite_values_are_dropped() {
        let mut readings = Readings::new();
        readings.add(Quantity::Co2, f32::NAN);
        readings.add(Quantity::Pm10, f32::INFINITY);
        assert!(readings.is_empty());
    }
}
