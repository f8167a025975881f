use color_eyre::eyre::{
    Result,
    eyre,
};
use std::fmt;

pub const MAX_TURNS: u64 = 10;

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct CityRecord {
    pub turn: u64,
    pub wood: u64,
    pub steel: u64,
    pub energy: u64,
    pub residential: u64,
    pub factory: u64,
    pub power_plant: u64,
}

impl CityRecord {
    pub fn phase(&self) -> GamePhase {
        GamePhase::from_turn(self.turn)
    }

    pub fn count_of(&self, structure: Structure) -> u64 {
        match structure {
            Structure::Residential => self.residential,
            Structure::Factory => self.factory,
            Structure::PowerPlant => self.power_plant,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum GamePhase {
    NotStarted,
    Active,
    Completed,
}

impl GamePhase {
    pub fn from_turn(turn: u64) -> Self {
        match turn {
            0 => GamePhase::NotStarted,
            1..=MAX_TURNS => GamePhase::Active,
            _ => GamePhase::Completed,
        }
    }

    pub fn allows_building(self) -> bool {
        matches!(self, GamePhase::Active)
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum Structure {
    Residential,
    Factory,
    PowerPlant,
}

impl Structure {
    pub const ALL: [Structure; 3] = [
        Structure::Residential,
        Structure::Factory,
        Structure::PowerPlant,
    ];

    // Matches the contract's building enum.
    pub fn code(self) -> u8 {
        match self {
            Structure::Residential => 0,
            Structure::Factory => 1,
            Structure::PowerPlant => 2,
        }
    }

    pub fn from_code(code: u8) -> Result<Self> {
        match code {
            0 => Ok(Structure::Residential),
            1 => Ok(Structure::Factory),
            2 => Ok(Structure::PowerPlant),
            other => Err(eyre!("Unknown structure code {other}")),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Structure::Residential => "Residential",
            Structure::Factory => "Factory",
            Structure::PowerPlant => "Power Plant",
        }
    }

    // Costs are enforced by the contract; these only label the actions.
    pub fn cost_label(self) -> &'static str {
        match self {
            Structure::Residential => "100W, 50S",
            Structure::Factory => "200S, 100E",
            Structure::PowerPlant => "150W, 100E",
        }
    }
}

impl fmt::Display for Structure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

pub fn truncate_address(address: &str) -> String {
    let chars: Vec<char> = address.chars().collect();
    if chars.len() <= 10 {
        return address.to_string();
    }
    let head: String = chars[..6].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{head}...{tail}")
}

#[cfg(test)]
#[allow(non_snake_case)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn truncate_address__keeps_prefix_and_suffix() {
        // given
        let address = "0x1ed5e4117958597D6Bd4c4426C37B4F1f0dEa267";

        // when
        let short = truncate_address(address);

        // then
        assert_eq!(short, "0x1ed5...a267");
    }

    #[test]
    fn truncate_address__leaves_short_input_alone() {
        assert_eq!(truncate_address("0xabcd"), "0xabcd");
        assert_eq!(truncate_address(""), "");
    }

    #[test]
    fn phase__follows_turn_boundaries() {
        assert_eq!(GamePhase::from_turn(0), GamePhase::NotStarted);
        assert_eq!(GamePhase::from_turn(1), GamePhase::Active);
        assert_eq!(GamePhase::from_turn(MAX_TURNS), GamePhase::Active);
        assert_eq!(GamePhase::from_turn(MAX_TURNS + 1), GamePhase::Completed);
    }

    #[test]
    fn structure__codes_match_contract_enum() {
        assert_eq!(Structure::Residential.code(), 0);
        assert_eq!(Structure::Factory.code(), 1);
        assert_eq!(Structure::PowerPlant.code(), 2);
        assert!(Structure::from_code(3).is_err());
    }

    #[test]
    fn count_of__reads_matching_field() {
        let city = CityRecord {
            turn: 2,
            residential: 4,
            factory: 1,
            power_plant: 7,
            ..CityRecord::default()
        };
        assert_eq!(city.count_of(Structure::Residential), 4);
        assert_eq!(city.count_of(Structure::Factory), 1);
        assert_eq!(city.count_of(Structure::PowerPlant), 7);
    }

    proptest! {
        #![proptest_config(ProptestConfig { cases: 64, .. ProptestConfig::default() })]

        #[test]
        fn truncate_address__is_ten_chars_plus_ellipsis(bytes in proptest::array::uniform20(any::<u8>())) {
            let address = format!("0x{}", hex::encode(bytes));
            let short = truncate_address(&address);
            prop_assert_eq!(short.len(), 13);
            prop_assert!(short.starts_with(&address[..6]));
            prop_assert!(short.ends_with(&address[address.len() - 4..]));
        }

        #[test]
        fn building_allowed_only_while_active(turn in 0u64..1_000) {
            let allowed = GamePhase::from_turn(turn).allows_building();
            prop_assert_eq!(allowed, (1..=MAX_TURNS).contains(&turn));
        }

        #[test]
        fn structure_code_roundtrips(code in 0u8..3) {
            prop_assert_eq!(Structure::from_code(code).unwrap().code(), code);
        }
    }
}
