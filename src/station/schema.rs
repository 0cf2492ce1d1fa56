/// City assigned to stations whose source file has no city column.
pub const DEFAULT_CITY: &str = "Chicago";

/// Column layouts seen across the historical station exports.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StationSchema {
    /// `id,name,latitude,longitude,dpcapacity[,...]` (2013 - 2016 exports).
    Legacy,
    /// `id,name,city,latitude,longitude,dpcapacity[,...]` (2017 exports onward).
    Modern,
}

/// Column offsets for the fields a station row is built from.
#[derive(Clone, Copy, Debug)]
pub struct StationColumns {
    pub id: usize,
    pub name: usize,
    pub city: Option<usize>,
    pub latitude: usize,
    pub longitude: usize,
    pub docks: usize,
}

impl StationSchema {
    pub fn columns(&self) -> StationColumns {
        match self {
            StationSchema::Legacy => StationColumns {
                id: 0,
                name: 1,
                city: None,
                latitude: 2,
                longitude: 3,
                docks: 4,
            },
            StationSchema::Modern => StationColumns {
                id: 0,
                name: 1,
                city: Some(2),
                latitude: 3,
                longitude: 4,
                docks: 5,
            },
        }
    }

    /// Minimum number of fields a data row must carry.
    pub fn min_fields(&self) -> usize {
        self.columns().docks + 1
    }

    pub fn as_str(&self) -> &str {
        match self {
            StationSchema::Legacy => "legacy",
            StationSchema::Modern => "modern",
        }
    }
}
