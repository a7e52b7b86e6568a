//! Lane geometry for the highway
//!
//! Segments are immutable once the highway is built. Lookup by world `y`
//! is a pure function.

use anyhow::{anyhow, Result};

/// What a lane column of a segment can be used for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaneType {
    /// Regular traffic lane
    Driving,
    /// Hard shoulder / lay-by, never used by traffic
    Layby,
    /// Coned off
    Closed,
}

/// One stretch of road with a fixed lane layout
#[derive(Debug, Clone, PartialEq)]
pub struct RoadSegment {
    pub lane_count: usize,
    pub lane_width: f32,
    /// Column of the player's home lane (lane 0) within this segment
    pub start_lane_index: usize,
    /// Type of every column, left to right
    pub lane_types: Vec<LaneType>,
    /// World x of the left edge of column 0
    pub left_edge_x: f32,
}

impl RoadSegment {
    pub fn new(
        lane_count: usize,
        lane_width: f32,
        start_lane_index: usize,
        lane_types: Vec<LaneType>,
        left_edge_x: f32,
    ) -> Result<Self> {
        if lane_types.len() != lane_count {
            return Err(anyhow!(
                "Segment has {} lanes but {} lane types",
                lane_count,
                lane_types.len()
            ));
        }
        if start_lane_index >= lane_count {
            return Err(anyhow!(
                "Start lane index {} outside {} lanes",
                start_lane_index,
                lane_count
            ));
        }
        if !(lane_width > 0.0) {
            return Err(anyhow!("Lane width must be positive"));
        }
        Ok(Self {
            lane_count,
            lane_width,
            start_lane_index,
            lane_types,
            left_edge_x,
        })
    }

    /// A segment where every column is a driving lane.
    pub fn uniform(lane_count: usize, lane_width: f32, start_lane_index: usize) -> Result<Self> {
        Self::new(
            lane_count,
            lane_width,
            start_lane_index,
            vec![LaneType::Driving; lane_count],
            0.0,
        )
    }

    fn column(&self, lane: usize) -> Option<usize> {
        let column = self.start_lane_index + lane;
        (column < self.lane_count).then_some(column)
    }

    /// Type of a logical lane, `None` if the segment does not have it.
    pub fn lane_type(&self, lane: usize) -> Option<LaneType> {
        self.column(lane).map(|column| self.lane_types[column])
    }

    /// Whether traffic may drive in the lane.
    pub fn is_drivable(&self, lane: usize) -> bool {
        self.lane_type(lane) == Some(LaneType::Driving)
    }

    /// World x of the centre of a logical lane.
    pub fn lane_center_x(&self, lane: usize) -> Option<f32> {
        self.column(lane)
            .map(|column| self.left_edge_x + (column as f32 + 0.5) * self.lane_width)
    }

    /// Logical lane under a world x, if any.
    pub fn lane_at_x(&self, x: f32) -> Option<usize> {
        let offset = (x - self.left_edge_x) / self.lane_width;
        if !(offset >= 0.0) {
            return None;
        }
        let column = offset.floor() as usize;
        if column >= self.lane_count || column < self.start_lane_index {
            return None;
        }
        Some(column - self.start_lane_index)
    }

    /// Highest logical lane index the segment has.
    pub fn highest_lane(&self) -> usize {
        self.lane_count - 1 - self.start_lane_index
    }

    /// Logical lanes that carry traffic (never includes the home lane).
    pub fn traffic_lanes(&self) -> impl Iterator<Item = usize> + '_ {
        (1..=self.highest_lane()).filter(move |lane| self.is_drivable(*lane))
    }

    /// World x of the right edge of the road
    pub fn right_edge_x(&self) -> f32 {
        self.left_edge_x + self.lane_count as f32 * self.lane_width
    }
}

/// Source of the active road segment for a world `y`.
///
/// Implementations must be pure functions of `y`.
pub trait LaneGeometry: Send + Sync {
    fn segment_at(&self, y: f32) -> &RoadSegment;
}

/// A highway made of segments laid end to end, starting at `y = 0` and
/// running toward negative `y`.
#[derive(Debug, Clone)]
pub struct Highway {
    segments: Vec<RoadSegment>,
    /// `y` at which each segment starts; strictly decreasing
    starts: Vec<f32>,
}

impl Highway {
    /// Build from `(length, segment)` pairs in travel order.
    pub fn new(sections: Vec<(f32, RoadSegment)>) -> Result<Self> {
        if sections.is_empty() {
            return Err(anyhow!("Highway needs at least one segment"));
        }
        let mut segments = Vec::with_capacity(sections.len());
        let mut starts = Vec::with_capacity(sections.len());
        let mut y = 0.0;
        for (length, segment) in sections {
            if !(length > 0.0) {
                return Err(anyhow!("Segment length must be positive, got {}", length));
            }
            starts.push(y);
            segments.push(segment);
            y -= length;
        }
        Ok(Self { segments, starts })
    }

    /// A highway with a single layout that never ends.
    pub fn straight(segment: RoadSegment) -> Self {
        Self {
            segments: vec![segment],
            starts: vec![0.0],
        }
    }

    /// The layout used by the headless binary: four lanes, a stretch that
    /// gains a fast lane, a lay-by section and a lane drop.
    pub fn create_test_highway() -> Result<Self> {
        use LaneType::*;
        Self::new(vec![
            (6000.0, RoadSegment::new(4, 100.0, 0, vec![Driving; 4], 0.0)?),
            (8000.0, RoadSegment::new(5, 100.0, 0, vec![Driving; 5], 0.0)?),
            (
                4000.0,
                RoadSegment::new(5, 100.0, 1, vec![Layby, Driving, Driving, Driving, Driving], -100.0)?,
            ),
            (8000.0, RoadSegment::new(3, 100.0, 0, vec![Driving; 3], 0.0)?),
            (1.0, RoadSegment::new(4, 100.0, 0, vec![Driving; 4], 0.0)?),
        ])
    }

    pub fn segments(&self) -> &[RoadSegment] {
        &self.segments
    }
}

impl LaneGeometry for Highway {
    fn segment_at(&self, y: f32) -> &RoadSegment {
        // Number of segments that start at or behind `y`
        let started = self.starts.partition_point(|start| *start >= y);
        &self.segments[started.saturating_sub(1)]
    }
}
