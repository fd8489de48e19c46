//! The static coordinate reference system catalog (`spec.md` §1 non-goal:
//! "The static catalog of coordinate reference systems, consumed as an
//! opaque `(code -> proj4-string)` lookup"). Production deployments would
//! load this from a maintained EPSG registry; this module is a small, real
//! table sufficient to exercise C2 end-to-end and to serve
//! `GET /api/projections`.

use once_cell::sync::Lazy;

use crate::model::reference::ReferenceDescriptor;

static CATALOG: Lazy<Vec<ReferenceDescriptor>> = Lazy::new(|| {
    vec![
        ReferenceDescriptor {
            code: "EPSG:4326".into(),
            name: "WGS 84".into(),
            region: "World".into(),
            datum: "WGS84".into(),
            proj4: "+proj=longlat +datum=WGS84 +no_defs".into(),
        },
        ReferenceDescriptor {
            code: "EPSG:3857".into(),
            name: "WGS 84 / Pseudo-Mercator".into(),
            region: "World".into(),
            datum: "WGS84".into(),
            proj4: "+proj=merc +a=6378137 +b=6378137 +lat_ts=0 +lon_0=0 +x_0=0 +y_0=0 +k=1 +units=m +nadgrids=@null +wktext +no_defs".into(),
        },
        ReferenceDescriptor {
            code: "EPSG:2154".into(),
            name: "RGF93 / Lambert-93".into(),
            region: "France".into(),
            datum: "RGF93".into(),
            proj4: "+proj=lcc +lat_1=49 +lat_2=44 +lat_0=46.5 +lon_0=3 +x_0=700000 +y_0=6600000 +ellps=GRS80 +towgs84=0,0,0,0,0,0,0 +units=m +no_defs".into(),
        },
        ReferenceDescriptor {
            code: "EPSG:27700".into(),
            name: "OSGB36 / British National Grid".into(),
            region: "United Kingdom".into(),
            datum: "OSGB36".into(),
            proj4: "+proj=tmerc +lat_0=49 +lon_0=-2 +k=0.9996012717 +x_0=400000 +y_0=-100000 +ellps=airy +datum=OSGB36 +units=m +no_defs".into(),
        },
        ReferenceDescriptor {
            code: "EPSG:25832".into(),
            name: "ETRS89 / UTM zone 32N".into(),
            region: "Europe".into(),
            datum: "ETRS89".into(),
            proj4: "+proj=utm +zone=32 +ellps=GRS80 +towgs84=0,0,0,0,0,0,0 +units=m +no_defs".into(),
        },
    ]
});

/// Lists the catalog, optionally filtered by `region` (case-insensitive
/// substring) and/or `search` (matched against `code` and `name`), per
/// `GET /api/projections` (`spec.md` §6).
pub fn list(region: Option<&str>, search: Option<&str>) -> Vec<ReferenceDescriptor> {
    CATALOG
        .iter()
        .filter(|r| {
            region
                .map(|wanted| r.region.to_lowercase().contains(&wanted.to_lowercase()))
                .unwrap_or(true)
        })
        .filter(|r| {
            search
                .map(|wanted| {
                    let wanted = wanted.to_lowercase();
                    r.code.to_lowercase().contains(&wanted) || r.name.to_lowercase().contains(&wanted)
                })
                .unwrap_or(true)
        })
        .cloned()
        .collect()
}

pub fn find(code: &str) -> Option<ReferenceDescriptor> {
    CATALOG.iter().find(|r| r.code == code).cloned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_wgs84_by_code() {
        let found = find("EPSG:4326").expect("EPSG:4326 must be in the catalog");
        assert_eq!(found.name, "WGS 84");
    }

    #[test]
    fn unknown_code_is_none() {
        assert!(find("EPSG:0").is_none());
    }

    #[test]
    fn region_filter_is_case_insensitive() {
        let results = list(Some("france"), None);
        assert!(results.iter().any(|r| r.code == "EPSG:2154"));
    }

    #[test]
    fn search_matches_name_substring() {
        let results = list(None, Some("mercator"));
        assert!(results.iter().any(|r| r.code == "EPSG:3857"));
    }
}
