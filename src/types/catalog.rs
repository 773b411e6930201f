//! Reference Data
//!
//! Static sports and cities/areas catalogs. Read-only at runtime, keyed by code.

use serde::Serialize;

#[derive(Debug, Clone, Copy, Serialize)]
pub struct Sport {
    pub id: &'static str,
    pub name: &'static str,
    pub icon: &'static str,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct Area {
    pub id: &'static str,
    pub name: &'static str,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct City {
    pub id: &'static str,
    pub name: &'static str,
    pub country: &'static str,
    pub areas: &'static [Area],
}

const fn sport(id: &'static str, name: &'static str, icon: &'static str) -> Sport {
    Sport { id, name, icon }
}

const fn area(id: &'static str, name: &'static str) -> Area {
    Area { id, name }
}

pub static SPORTS: &[Sport] = &[
    sport("football", "Football", "fas fa-futbol"),
    sport("basketball", "Basketball", "fas fa-basketball-ball"),
    sport("tennis", "Tennis", "fas fa-table-tennis"),
    sport("swimming", "Swimming", "fas fa-swimmer"),
    sport("running", "Running", "fas fa-running"),
    sport("cycling", "Cycling", "fas fa-bicycle"),
    sport("volleyball", "Volleyball", "fas fa-volleyball-ball"),
    sport("badminton", "Badminton", "fas fa-shuttlecock"),
    sport("cricket", "Cricket", "fas fa-baseball-ball"),
    sport("golf", "Golf", "fas fa-golf-ball"),
    sport("hockey", "Hockey", "fas fa-hockey-puck"),
    sport("boxing", "Boxing", "fas fa-fist-raised"),
    sport("yoga", "Yoga", "fas fa-spa"),
    sport("gym", "Gym/Fitness", "fas fa-dumbbell"),
    sport("martial-arts", "Martial Arts", "fas fa-fist-raised"),
];

pub static CITIES: &[City] = &[
    City {
        id: "new-york",
        name: "New York",
        country: "United States",
        areas: &[
            area("manhattan", "Manhattan"),
            area("brooklyn", "Brooklyn"),
            area("queens", "Queens"),
            area("bronx", "Bronx"),
            area("staten-island", "Staten Island"),
        ],
    },
    City {
        id: "los-angeles",
        name: "Los Angeles",
        country: "United States",
        areas: &[
            area("hollywood", "Hollywood"),
            area("beverly-hills", "Beverly Hills"),
            area("santa-monica", "Santa Monica"),
            area("downtown-la", "Downtown LA"),
            area("venice", "Venice"),
        ],
    },
    City {
        id: "chicago",
        name: "Chicago",
        country: "United States",
        areas: &[
            area("loop", "The Loop"),
            area("north-side", "North Side"),
            area("south-side", "South Side"),
            area("west-side", "West Side"),
            area("lincoln-park", "Lincoln Park"),
        ],
    },
    City {
        id: "houston",
        name: "Houston",
        country: "United States",
        areas: &[
            area("downtown-houston", "Downtown"),
            area("midtown", "Midtown"),
            area("montrose", "Montrose"),
            area("heights", "Heights"),
            area("galleria", "Galleria"),
        ],
    },
    City {
        id: "miami",
        name: "Miami",
        country: "United States",
        areas: &[
            area("south-beach", "South Beach"),
            area("downtown-miami", "Downtown"),
            area("coral-gables", "Coral Gables"),
            area("wynwood", "Wynwood"),
            area("brickell", "Brickell"),
        ],
    },
    City {
        id: "london",
        name: "London",
        country: "United Kingdom",
        areas: &[
            area("central-london", "Central London"),
            area("north-london", "North London"),
            area("south-london", "South London"),
            area("east-london", "East London"),
            area("west-london", "West London"),
        ],
    },
    City {
        id: "toronto",
        name: "Toronto",
        country: "Canada",
        areas: &[
            area("downtown-toronto", "Downtown"),
            area("north-york", "North York"),
            area("scarborough", "Scarborough"),
            area("etobicoke", "Etobicoke"),
            area("york", "York"),
        ],
    },
    City {
        id: "sydney",
        name: "Sydney",
        country: "Australia",
        areas: &[
            area("cbd", "CBD"),
            area("bondi", "Bondi"),
            area("manly", "Manly"),
            area("parramatta", "Parramatta"),
            area("chatswood", "Chatswood"),
        ],
    },
];

pub fn sport_by_id(id: &str) -> Option<&'static Sport> {
    SPORTS.iter().find(|sport| sport.id == id)
}

pub fn city_by_id(id: &str) -> Option<&'static City> {
    CITIES.iter().find(|city| city.id == id)
}

/// 도시에 속한 지역만 허용
pub fn area_in_city(city_id: &str, area_id: &str) -> bool {
    city_by_id(city_id).is_some_and(|city| city.areas.iter().any(|area| area.id == area_id))
}
