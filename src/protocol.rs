// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

//! Wire format of the routing socket.
//!
//! Every message is a 2-byte, big-endian length `L`, followed by `L` bytes of UTF-8 text.
//! A client sends one [RouteRequest] as JSON and receives one [RouteResponse] as GeoJSON,
//! after which the connection is closed. Requests which can't be processed are answered
//! with an empty message.

use geojson::{Feature, FeatureCollection, GeoJson, Geometry, JsonObject, JsonValue, Value};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::{Coordinate, Route, RoutingIndex};

/// Largest payload which fits into a single frame, in bytes.
pub const MAX_FRAME_LEN: usize = u16::MAX as usize;

const NO_ROUTE_MESSAGE: &str = "no path found";

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("payload of {0} bytes exceeds the 65535 byte frame limit")]
    FrameTooLarge(usize),

    #[error("payload is not valid UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),

    #[error("malformed JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("position {0} is out of range")]
    InvalidPosition(Coordinate),

    #[error("malformed response: {0}")]
    MalformedResponse(&'static str),
}

/// Reads one length-prefixed message.
pub async fn read_frame<R: AsyncRead + Unpin>(r: &mut R) -> Result<String, Error> {
    let len = r.read_u16().await?;
    let mut buf = vec![0; len as usize];
    r.read_exact(&mut buf).await?;
    Ok(String::from_utf8(buf)?)
}

/// Writes one length-prefixed message.
pub async fn write_frame<W: AsyncWrite + Unpin>(w: &mut W, payload: &str) -> Result<(), Error> {
    let len = u16::try_from(payload.len()).map_err(|_| Error::FrameTooLarge(payload.len()))?;
    w.write_u16(len).await?;
    w.write_all(payload.as_bytes()).await?;
    w.flush().await?;
    Ok(())
}

/// Performs a client-side exchange: sends `request` and waits for the single response.
pub async fn exchange<S: AsyncRead + AsyncWrite + Unpin>(
    stream: &mut S,
    request: &str,
) -> Result<String, Error> {
    write_frame(stream, request).await?;
    read_frame(stream).await
}

/// A routing query between two positions.
///
/// Encoded as `{"s": {"lat": ..., "lon": ...}, "t": {"lat": ..., "lon": ...}}`;
/// unknown fields are ignored.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RouteRequest {
    #[serde(rename = "s")]
    pub origin: Coordinate,

    #[serde(rename = "t")]
    pub destination: Coordinate,
}

impl RouteRequest {
    /// Parses a request, rejecting positions outside of the valid
    /// latitude and longitude ranges.
    pub fn decode(payload: &str) -> Result<Self, Error> {
        let request: Self = serde_json::from_str(payload)?;
        for position in [request.origin, request.destination] {
            if !position.is_valid() {
                return Err(Error::InvalidPosition(position));
            }
        }
        Ok(request)
    }

    pub fn encode(&self) -> Result<String, Error> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Outcome of a routing query.
#[derive(Debug, Clone, PartialEq)]
pub enum RouteResponse {
    /// A route was found.
    Found {
        /// Positions along the route, from the origin to the destination.
        path: Vec<Coordinate>,

        /// Total length, in kilometers.
        distance_km: f64,

        /// Total travel time, in minutes.
        travel_time_min: f64,
    },

    /// The query was understood, but no route could be given.
    NotFound { reason: String },
}

impl RouteResponse {
    pub fn from_route(index: &RoutingIndex, route: &Route) -> Self {
        Self::Found {
            path: index.positions(&route.nodes).collect(),
            distance_km: route.distance_km(),
            travel_time_min: route.travel_time_min(),
        }
    }

    pub fn no_route() -> Self {
        Self::NotFound {
            reason: NO_ROUTE_MESSAGE.to_string(),
        }
    }

    /// Encodes the response as a GeoJSON FeatureCollection.
    ///
    /// A found route is a single LineString feature with `costs.Distance` and
    /// `costs.Travel_Time` properties. Otherwise, the collection is empty and
    /// carries the reason in a top-level `error` member.
    pub fn encode(&self) -> Result<String, Error> {
        let collection = match self {
            Self::Found {
                path,
                distance_km,
                travel_time_min,
            } => {
                let line = path.iter().map(|c| vec![c.lon, c.lat]).collect();

                let mut properties = JsonObject::new();
                properties.insert(
                    "costs".to_string(),
                    serde_json::json!({
                        "Distance": distance_km,
                        "Travel_Time": travel_time_min,
                    }),
                );

                FeatureCollection {
                    bbox: None,
                    features: vec![Feature {
                        bbox: None,
                        geometry: Some(Geometry::new(Value::LineString(line))),
                        id: None,
                        properties: Some(properties),
                        foreign_members: None,
                    }],
                    foreign_members: None,
                }
            }

            Self::NotFound { reason } => {
                let mut members = JsonObject::new();
                members.insert("error".to_string(), JsonValue::from(reason.as_str()));
                FeatureCollection {
                    bbox: None,
                    features: vec![],
                    foreign_members: Some(members),
                }
            }
        };

        Ok(serde_json::to_string(&collection)?)
    }

    pub fn decode(payload: &str) -> Result<Self, Error> {
        let GeoJson::FeatureCollection(collection) = serde_json::from_str::<GeoJson>(payload)? else {
            return Err(Error::MalformedResponse("expected a FeatureCollection"));
        };

        let Some(feature) = collection.features.first() else {
            let reason = collection
                .foreign_members
                .as_ref()
                .and_then(|m| m.get("error"))
                .and_then(JsonValue::as_str)
                .unwrap_or(NO_ROUTE_MESSAGE);
            return Ok(Self::NotFound {
                reason: reason.to_string(),
            });
        };

        let path = match feature.geometry.as_ref().map(|g| &g.value) {
            Some(Value::LineString(line)) => line
                .iter()
                .map(|p| match p.as_slice() {
                    [lon, lat, ..] => Ok(Coordinate::new(*lat, *lon)),
                    _ => Err(Error::MalformedResponse("position with less than 2 components")),
                })
                .collect::<Result<Vec<_>, _>>()?,
            _ => return Err(Error::MalformedResponse("expected a LineString geometry")),
        };

        let costs = feature
            .property("costs")
            .ok_or(Error::MalformedResponse("missing costs"))?;
        let cost = |key: &'static str| {
            costs
                .get(key)
                .and_then(JsonValue::as_f64)
                .ok_or(Error::MalformedResponse(key))
        };

        Ok(Self::Found {
            path,
            distance_km: cost("Distance")?,
            travel_time_min: cost("Travel_Time")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Network, DEFAULT_STEP_LIMIT};

    #[tokio::test]
    async fn frame_round_trip() {
        let (mut client, mut server) = tokio::io::duplex(1024);

        write_frame(&mut client, "{\"a\": \"zażółć\"}").await.unwrap();
        assert_eq!(read_frame(&mut server).await.unwrap(), "{\"a\": \"zażółć\"}");

        write_frame(&mut client, "").await.unwrap();
        assert_eq!(read_frame(&mut server).await.unwrap(), "");
    }

    #[tokio::test]
    async fn frame_layout() {
        let mut buf: Vec<u8> = Vec::new();
        write_frame(&mut buf, "hi").await.unwrap();
        assert_eq!(buf, vec![0x00, 0x02, b'h', b'i']);
    }

    #[tokio::test]
    async fn frame_too_large() {
        let mut buf: Vec<u8> = Vec::new();
        let payload = "x".repeat(MAX_FRAME_LEN + 1);
        assert!(matches!(
            write_frame(&mut buf, &payload).await,
            Err(Error::FrameTooLarge(65536))
        ));
        assert!(buf.is_empty());

        let payload = "x".repeat(MAX_FRAME_LEN);
        write_frame(&mut buf, &payload).await.unwrap();
        assert_eq!(buf.len(), MAX_FRAME_LEN + 2);
    }

    #[tokio::test]
    async fn truncated_frame() {
        let data: &[u8] = &[0x00, 0x05, b'a', b'b'];
        let mut r = data;
        assert!(matches!(read_frame(&mut r).await, Err(Error::Io(_))));
    }

    #[tokio::test]
    async fn invalid_utf8() {
        let data: &[u8] = &[0x00, 0x02, 0xff, 0xfe];
        let mut r = data;
        assert!(matches!(read_frame(&mut r).await, Err(Error::Utf8(_))));
    }

    #[test]
    fn request_decoding() {
        let r = RouteRequest::decode(
            r#"{"s": {"lat": 48.1, "lon": 11.5}, "t": {"lat": 48.2, "lon": 11.6, "x": 1}, "mode": "car"}"#,
        )
        .unwrap();
        assert_eq!(r.origin, Coordinate::new(48.1, 11.5));
        assert_eq!(r.destination, Coordinate::new(48.2, 11.6));

        assert_eq!(RouteRequest::decode(&r.encode().unwrap()).unwrap(), r);

        assert!(RouteRequest::decode(r#"{"s": {"lat": 48.1, "lon": 11.5}}"#).is_err());
        assert!(RouteRequest::decode(r#"{"s": {"lat": "x", "lon": 11.5}, "t": {}}"#).is_err());
        assert!(RouteRequest::decode("").is_err());
    }

    #[test]
    fn request_out_of_range() {
        assert!(matches!(
            RouteRequest::decode(r#"{"s": {"lat": 95.0, "lon": 11.5}, "t": {"lat": 48.2, "lon": 11.6}}"#),
            Err(Error::InvalidPosition(c)) if c == Coordinate::new(95.0, 11.5)
        ));
        assert!(matches!(
            RouteRequest::decode(r#"{"s": {"lat": 48.1, "lon": 11.5}, "t": {"lat": 48.2, "lon": -200.0}}"#),
            Err(Error::InvalidPosition(c)) if c == Coordinate::new(48.2, -200.0)
        ));
    }

    #[test]
    fn response_round_trip() {
        let mut g = Network::new();
        g.add_edge(Coordinate::new(48.1, 11.5), Coordinate::new(48.1, 11.51), 50.0);
        g.add_edge(Coordinate::new(48.1, 11.51), Coordinate::new(48.11, 11.51), 30.0);
        let index = RoutingIndex::new(g);

        let route = index
            .route(
                Coordinate::new(48.1, 11.5),
                Coordinate::new(48.11, 11.51),
                DEFAULT_STEP_LIMIT,
            )
            .unwrap()
            .unwrap();
        let response = RouteResponse::from_route(&index, &route);
        let decoded = RouteResponse::decode(&response.encode().unwrap()).unwrap();

        let RouteResponse::Found {
            path,
            distance_km,
            travel_time_min,
        } = decoded
        else {
            panic!("expected a route, got {:?}", decoded);
        };

        assert_eq!(
            path,
            vec![
                Coordinate::new(48.1, 11.5),
                Coordinate::new(48.1, 11.51),
                Coordinate::new(48.11, 11.51),
            ]
        );
        assert!((distance_km - route.distance_km()).abs() < 1e-6);
        assert!((travel_time_min - route.travel_time_min()).abs() < 1e-6);
    }

    #[test]
    fn response_layout() {
        let response = RouteResponse::Found {
            path: vec![Coordinate::new(1.0, 2.0), Coordinate::new(3.0, 4.0)],
            distance_km: 1.5,
            travel_time_min: 2.5,
        };
        let json: JsonValue = serde_json::from_str(&response.encode().unwrap()).unwrap();

        assert_eq!(json["type"], "FeatureCollection");
        assert_eq!(json["features"].as_array().unwrap().len(), 1);
        assert_eq!(json["features"][0]["geometry"]["type"], "LineString");
        assert_eq!(
            json["features"][0]["geometry"]["coordinates"],
            serde_json::json!([[2.0, 1.0], [4.0, 3.0]])
        );
        assert_eq!(json["features"][0]["properties"]["costs"]["Distance"], 1.5);
        assert_eq!(json["features"][0]["properties"]["costs"]["Travel_Time"], 2.5);
    }

    #[test]
    fn no_route_round_trip() {
        let encoded = RouteResponse::no_route().encode().unwrap();
        let json: JsonValue = serde_json::from_str(&encoded).unwrap();
        assert_eq!(json["features"], serde_json::json!([]));
        assert_eq!(json["error"], "no path found");

        assert_eq!(
            RouteResponse::decode(&encoded).unwrap(),
            RouteResponse::no_route()
        );
    }

    #[test]
    fn malformed_response() {
        assert!(RouteResponse::decode("").is_err());
        assert!(matches!(
            RouteResponse::decode(r#"{"type":"Point","coordinates":[1,2]}"#),
            Err(Error::MalformedResponse(_))
        ));
        assert!(matches!(
            RouteResponse::decode(
                r#"{"type":"FeatureCollection","features":[{"type":"Feature","properties":{},
                "geometry":{"type":"LineString","coordinates":[[1,2],[3,4]]}}]}"#
            ),
            Err(Error::MalformedResponse("missing costs"))
        ));
    }
}
